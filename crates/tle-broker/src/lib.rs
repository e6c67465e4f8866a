//! Broker adapter contract: the single boundary between the engine and a
//! concrete broker connection. Methods are blocking — the core makes no
//! assumption about the adapter's internal threading, only that calls
//! return (quickly, in practice) rather than requiring the caller to poll.

use tle_money::Micros;
use tle_schemas::{Direction, Position, Quote, SymbolInfo, Ticket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// `get_quote` returned a tick older than the staleness bound.
    Stale,
    /// Transport/connection failure; distinct from a broker-level rejection.
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceResult {
    Filled {
        ticket: Ticket,
        actual_volume: f64,
        actual_price: Micros,
    },
    /// Treated as filled for the reported portion; the remainder is discarded,
    /// not retried.
    Partial {
        ticket: Ticket,
        actual_volume: f64,
        actual_price: Micros,
    },
    Rejected {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyResult {
    Ok,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseResult {
    Ok,
    Rejected { reason: String },
}

/// Implemented once per concrete broker connection (simulation, live REST
/// adapter, ...). Every call into a real broker happens through this trait;
/// no other component is permitted to hold a transport handle directly.
pub trait BrokerAdapter: Send + Sync {
    fn get_symbols(&self) -> Result<Vec<SymbolInfo>, BrokerError>;

    /// Fails with `BrokerError::Stale` if the quote's timestamp is more than
    /// 5 seconds old relative to the adapter's own clock.
    fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError>;

    fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    fn place_order(
        &self,
        symbol: &str,
        direction: Direction,
        volume: f64,
        sl_price: Micros,
        tp_price: Option<Micros>,
    ) -> Result<PlaceResult, BrokerError>;

    /// The broker may reject this based on a stops-level constraint (minimum
    /// distance from current price) or because the position was closed.
    fn modify_order(&self, ticket: Ticket, sl_price: Micros) -> Result<ModifyResult, BrokerError>;

    fn close_position(&self, ticket: Ticket, comment: &str) -> Result<CloseResult, BrokerError>;
}
