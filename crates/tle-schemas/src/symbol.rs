use serde::{Deserialize, Serialize};
use tle_money::Micros;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeMode {
    Full,
    CloseOnly,
    Disabled,
}

/// Broker-reported symbol metadata needed for lot sizing and SL validity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub min_lot: f64,
    pub lot_step: f64,
    pub max_lot: Option<f64>,
    /// USD per 1.0 price-unit move per 1.0 lot. Broker-dependent and opaque
    /// to the core (see Open Question 1 in the design notes).
    pub contract_value: Micros,
    pub spread: Micros,
    pub trade_mode: TradeMode,
    /// Minimum distance the broker allows between current price and SL/TP.
    pub stops_level: Micros,
    pub price_step: Micros,
}

/// A bid/ask quote with a wall-clock timestamp, used for staleness checks.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Micros,
    pub ask: Micros,
    pub ts: chrono::DateTime<chrono::Utc>,
}

impl Quote {
    /// Closing-side price for the given direction: a LONG closes at bid, a
    /// SHORT closes at ask.
    pub fn close_price(&self, direction: crate::Direction) -> Micros {
        match direction {
            crate::Direction::Long => self.bid,
            crate::Direction::Short => self.ask,
        }
    }
}
