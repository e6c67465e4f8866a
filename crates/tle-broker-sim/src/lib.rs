//! Deterministic in-memory broker adapter for simulation mode.
//!
//! Design decisions (kept intentionally simple/deterministic, in the spirit
//! of a paper-trading adapter):
//! - Tickets are assigned from a monotonically increasing counter, never
//!   randomly, so scenario tests can predict them.
//! - No network, no randomness. Quotes and symbols are whatever the test or
//!   the simulation harness configured via `set_quote`/`set_symbol`.
//! - `place_order` always fills at the configured quote's close price for
//!   the requested direction; there is no slippage model here (that lives in
//!   the simulation harness, not the broker contract).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tle_broker::{BrokerAdapter, BrokerError, CloseResult, ModifyResult, PlaceResult};
use tle_clock::Clock;
use tle_money::Micros;
use tle_schemas::{Direction, Position, Quote, SymbolInfo, Ticket, TradeMode};

const QUOTE_STALENESS_BOUND_MS: i64 = 5_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModifyRejection {
    pub ticket: Ticket,
    pub reason: String,
}

pub struct SimBroker {
    clock: Arc<dyn Clock>,
    symbols: Mutex<BTreeMap<String, SymbolInfo>>,
    quotes: Mutex<BTreeMap<String, Quote>>,
    positions: Mutex<BTreeMap<Ticket, Position>>,
    next_ticket: AtomicU64,
}

impl SimBroker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            symbols: Mutex::new(BTreeMap::new()),
            quotes: Mutex::new(BTreeMap::new()),
            positions: Mutex::new(BTreeMap::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn set_symbol(&self, info: SymbolInfo) {
        self.symbols
            .lock()
            .expect("symbols mutex poisoned")
            .insert(info.symbol.clone(), info);
    }

    pub fn set_quote(&self, symbol: impl Into<String>, quote: Quote) {
        self.quotes
            .lock()
            .expect("quotes mutex poisoned")
            .insert(symbol.into(), quote);
    }

    /// Seeds a position directly, bypassing `place_order`. Used by
    /// reconciliation scenarios to simulate a broker-side position the core
    /// never placed itself (e.g. after a restart).
    pub fn seed_position(&self, position: Position) {
        self.next_ticket
            .fetch_max(position.ticket.raw() + 1, Ordering::SeqCst);
        self.positions
            .lock()
            .expect("positions mutex poisoned")
            .insert(position.ticket, position);
    }

    /// Directly mutate a seeded/placed position's current broker SL, without
    /// going through `modify_order`. Used to simulate the broker having
    /// independently moved a stop (e.g. a trailing stop the terminal itself
    /// manages) ahead of a reconciliation pass.
    pub fn set_current_sl(&self, ticket: Ticket, sl: Option<Micros>) {
        if let Some(p) = self.positions.lock().expect("positions mutex poisoned").get_mut(&ticket) {
            p.current_sl = sl;
        }
    }

    fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        self.symbols.lock().expect("symbols mutex poisoned").get(symbol).cloned()
    }
}

impl BrokerAdapter for SimBroker {
    fn get_symbols(&self) -> Result<Vec<SymbolInfo>, BrokerError> {
        Ok(self.symbols.lock().expect("symbols mutex poisoned").values().cloned().collect())
    }

    fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        let quotes = self.quotes.lock().expect("quotes mutex poisoned");
        let quote = quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::Unavailable(format!("no quote configured for {symbol}")))?;

        let now_ms = self.clock.now_ms();
        let age_ms = now_ms - quote.ts.timestamp_millis();
        if age_ms > QUOTE_STALENESS_BOUND_MS {
            return Err(BrokerError::Stale);
        }
        Ok(quote)
    }

    fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self.positions.lock().expect("positions mutex poisoned").values().cloned().collect())
    }

    fn place_order(
        &self,
        symbol: &str,
        direction: Direction,
        volume: f64,
        sl_price: Micros,
        _tp_price: Option<Micros>,
    ) -> Result<PlaceResult, BrokerError> {
        let info = self
            .symbol_info(symbol)
            .ok_or_else(|| BrokerError::Unavailable(format!("unknown symbol {symbol}")))?;

        if info.trade_mode != TradeMode::Full {
            return Ok(PlaceResult::Rejected {
                reason: "TRADE_MODE_NOT_FULL".to_string(),
            });
        }

        let quote = self.get_quote(symbol)?;
        let entry_price = quote.close_price(direction);

        let ticket = Ticket::new(self.next_ticket.fetch_add(1, Ordering::SeqCst));
        let position = Position {
            ticket,
            symbol: symbol.to_string(),
            direction,
            entry_price,
            volume,
            current_price: entry_price,
            current_sl: Some(sl_price),
            opened_at: chrono::Utc::now(),
            version: 0,
        };
        self.positions
            .lock()
            .expect("positions mutex poisoned")
            .insert(ticket, position);

        Ok(PlaceResult::Filled {
            ticket,
            actual_volume: volume,
            actual_price: entry_price,
        })
    }

    fn modify_order(&self, ticket: Ticket, sl_price: Micros) -> Result<ModifyResult, BrokerError> {
        let mut positions = self.positions.lock().expect("positions mutex poisoned");
        let position = match positions.get_mut(&ticket) {
            Some(p) => p,
            None => {
                return Ok(ModifyResult::Rejected {
                    reason: "POSITION_CLOSED".to_string(),
                })
            }
        };

        let info = match self.symbol_info(&position.symbol) {
            Some(i) => i,
            None => {
                return Ok(ModifyResult::Rejected {
                    reason: "UNKNOWN_SYMBOL".to_string(),
                })
            }
        };

        let min_distance = info.stops_level.raw() + info.spread.raw();
        let distance = (sl_price.raw() - position.current_price.raw()).abs();
        if distance < min_distance {
            return Ok(ModifyResult::Rejected {
                reason: "STOPS_LEVEL".to_string(),
            });
        }

        position.current_sl = Some(sl_price);
        position.version += 1;
        Ok(ModifyResult::Ok)
    }

    fn close_position(&self, ticket: Ticket, _comment: &str) -> Result<CloseResult, BrokerError> {
        let mut positions = self.positions.lock().expect("positions mutex poisoned");
        if positions.remove(&ticket).is_some() {
            Ok(CloseResult::Ok)
        } else {
            Ok(CloseResult::Rejected {
                reason: "POSITION_CLOSED".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tle_clock::FakeClock;

    fn sample_symbol() -> SymbolInfo {
        SymbolInfo {
            symbol: "EURUSD".to_string(),
            min_lot: 0.01,
            lot_step: 0.01,
            max_lot: Some(1.0),
            contract_value: Micros::new(100_000_000_000),
            spread: tle_money::price_to_micros(0.0001).unwrap(),
            trade_mode: TradeMode::Full,
            stops_level: tle_money::price_to_micros(0.0005).unwrap(),
            price_step: tle_money::price_to_micros(0.00001).unwrap(),
        }
    }

    fn sample_quote(clock: &FakeClock) -> Quote {
        Quote {
            bid: tle_money::price_to_micros(1.10000).unwrap(),
            ask: tle_money::price_to_micros(1.10010).unwrap(),
            ts: chrono::DateTime::from_timestamp_millis(clock.now_ms()).unwrap(),
        }
    }

    #[test]
    fn place_order_assigns_sequential_tickets() {
        let clock = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        broker.set_symbol(sample_symbol());
        broker.set_quote("EURUSD", sample_quote(&clock));

        let r1 = broker
            .place_order("EURUSD", Direction::Long, 0.01, Micros::ZERO, None)
            .unwrap();
        let r2 = broker
            .place_order("EURUSD", Direction::Long, 0.01, Micros::ZERO, None)
            .unwrap();

        match (r1, r2) {
            (PlaceResult::Filled { ticket: t1, .. }, PlaceResult::Filled { ticket: t2, .. }) => {
                assert_eq!(t1.raw() + 1, t2.raw());
            }
            _ => panic!("expected both fills"),
        }
    }

    #[test]
    fn modify_order_rejects_within_stops_level() {
        let clock = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        broker.set_symbol(sample_symbol());
        broker.set_quote("EURUSD", sample_quote(&clock));

        let placed = broker
            .place_order("EURUSD", Direction::Long, 0.01, Micros::ZERO, None)
            .unwrap();
        let ticket = match placed {
            PlaceResult::Filled { ticket, .. } => ticket,
            _ => panic!("expected fill"),
        };

        let too_close = tle_money::price_to_micros(1.10005).unwrap();
        let result = broker.modify_order(ticket, too_close).unwrap();
        assert_eq!(
            result,
            ModifyResult::Rejected {
                reason: "STOPS_LEVEL".to_string()
            }
        );
    }

    #[test]
    fn get_quote_detects_staleness() {
        let clock = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        broker.set_quote("EURUSD", sample_quote(&clock));

        clock.advance_ms(6_000);
        let result = broker.get_quote("EURUSD");
        assert_eq!(result, Err(BrokerError::Stale));
    }

    #[test]
    fn close_position_on_unknown_ticket_is_rejected() {
        let clock = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        let result = broker.close_position(Ticket::new(999), "test").unwrap();
        assert_eq!(
            result,
            CloseResult::Rejected {
                reason: "POSITION_CLOSED".to_string()
            }
        );
    }
}
