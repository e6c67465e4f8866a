use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tle_audit::{AuditWriter, PositionClosureRecord};
use tle_broker::{BrokerAdapter, CloseResult};
use tle_config::Config;
use tle_execution::symbols::SymbolCache;
use tle_money::Micros;
use tle_registry::PositionRegistry;
use tle_schemas::{Position, SlReason, Ticket};

/// Result of one P3 closure attempt on a single ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureOutcome {
    Closed { profit_usd: Micros, reason: String },
    /// The ticket did not meet this bypass's preconditions; not an error.
    Skipped,
    Rejected { reason: String },
}

/// Pluggable external rule for §4.12(b) (e.g. an overnight-hold threshold).
/// Returns `Some(reason)` when `position` must be force-closed regardless of
/// profit.
pub trait CompliancePredicate: Send + Sync {
    fn evaluate(&self, position: &Position, now: DateTime<Utc>) -> Option<String>;
}

fn close_and_record(
    broker: &dyn BrokerAdapter,
    registry: &PositionRegistry,
    audit: &Mutex<AuditWriter>,
    run_id: uuid::Uuid,
    ticket: Ticket,
    profit_usd: Micros,
    reason: String,
) -> ClosureOutcome {
    match broker.close_position(ticket, &reason) {
        Ok(CloseResult::Ok) => {
            registry.remove(ticket);
            let mut writer = audit.lock().expect("audit writer mutex poisoned");
            let payload = PositionClosureRecord {
                ticket: ticket.raw(),
                close_time: Utc::now(),
                close_reason: reason.clone(),
                profit_usd,
            }
            .into_payload();
            if let Err(e) = writer.append(run_id, "position_closure", "P3_CLOSURE", payload) {
                tracing::warn!(error = ?e, ticket = ticket.raw(), "failed to append closure audit record");
            }
            ClosureOutcome::Closed { profit_usd, reason }
        }
        Ok(CloseResult::Rejected { reason }) => ClosureOutcome::Rejected { reason },
        Err(e) => ClosureOutcome::Rejected { reason: format!("{e:?}") },
    }
}

/// Whether `profit_usd` sits in the micro-profit closure band: either inside
/// the primary sweet-spot band, or beyond it but within
/// `micro_profit_extended_band_margin_usd` of a whole multiple of
/// `trailing_increment_usd` (gated behind `micro_profit_extended_band_enabled`,
/// off by default).
fn in_micro_profit_band(profit_usd: Micros, config: &Config) -> bool {
    if profit_usd <= config.sweet_spot_max_usd {
        return true;
    }
    if !config.micro_profit_extended_band_enabled {
        return false;
    }
    let step = config.trailing_increment_usd.raw();
    if step <= 0 {
        return false;
    }
    let nearest_multiple = ((profit_usd.raw() as f64 / step as f64).round() as i64) * step;
    (profit_usd.raw() - nearest_multiple).abs() <= config.micro_profit_extended_band_margin_usd.raw()
}

/// §4.12(a): scans every open position for the micro-profit closure
/// precondition chain, re-reading the current quote immediately before
/// closing so a price that moved out of band between scan and close is not
/// acted on. Never touches `modify_order` — this bypass only ever closes.
pub fn scan_micro_profit_closures(
    registry: &PositionRegistry,
    broker: &dyn BrokerAdapter,
    symbols: &SymbolCache,
    audit: &Mutex<AuditWriter>,
    config: &Config,
    run_id: uuid::Uuid,
) -> Vec<(Ticket, ClosureOutcome)> {
    let mut results = Vec::new();
    for position in registry.snapshot() {
        let Some(state) = registry.sl_state(position.ticket) else {
            continue;
        };
        if !matches!(state.last_applied_reason, SlReason::SweetSpot | SlReason::Trailing) {
            results.push((position.ticket, ClosureOutcome::Skipped));
            continue;
        }
        let Some(symbol_info) = symbols.get(&position.symbol) else {
            results.push((position.ticket, ClosureOutcome::Skipped));
            continue;
        };
        let floor = config.sweet_spot_min_usd + config.micro_profit_close_buffer_usd;
        let scan_profit = position.profit_usd(symbol_info.contract_value);
        if scan_profit < floor || !in_micro_profit_band(scan_profit, config) {
            results.push((position.ticket, ClosureOutcome::Skipped));
            continue;
        }

        let outcome = match broker.get_quote(&position.symbol) {
            Ok(quote) => {
                let mut reread = position.clone();
                reread.current_price = quote.close_price(position.direction);
                let reread_profit = reread.profit_usd(symbol_info.contract_value);
                if reread_profit < floor || !in_micro_profit_band(reread_profit, config) {
                    ClosureOutcome::Skipped
                } else {
                    close_and_record(
                        broker,
                        registry,
                        audit,
                        run_id,
                        position.ticket,
                        reread_profit,
                        "MICRO_PROFIT_CLOSURE".to_string(),
                    )
                }
            }
            Err(e) => ClosureOutcome::Rejected { reason: format!("{e:?}") },
        };
        results.push((position.ticket, outcome));
    }
    results
}

/// §4.12(b): force-closes any position the compliance predicate flags,
/// regardless of profit. The audit reason carries the `COMPLIANCE_` prefix
/// the predicate supplies so closures driven by external rules are
/// distinguishable from the profit-taking bypass.
pub fn scan_compliance_closures(
    registry: &PositionRegistry,
    broker: &dyn BrokerAdapter,
    symbols: &SymbolCache,
    audit: &Mutex<AuditWriter>,
    predicate: &dyn CompliancePredicate,
    now: DateTime<Utc>,
    run_id: uuid::Uuid,
) -> Vec<(Ticket, ClosureOutcome)> {
    let mut results = Vec::new();
    for position in registry.snapshot() {
        let Some(reason) = predicate.evaluate(&position, now) else {
            continue;
        };
        let profit_usd = symbols
            .get(&position.symbol)
            .map(|info| position.profit_usd(info.contract_value))
            .unwrap_or(Micros::ZERO);
        let outcome = close_and_record(
            broker,
            registry,
            audit,
            run_id,
            position.ticket,
            profit_usd,
            format!("COMPLIANCE_{reason}"),
        );
        results.push((position.ticket, outcome));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tle_broker_sim::SimBroker;
    use tle_clock::{Clock, FakeClock};
    use tle_schemas::{Direction, Quote, SlState, SymbolInfo, TradeMode};

    fn symbol_info() -> SymbolInfo {
        SymbolInfo {
            symbol: "EURUSD".to_string(),
            min_lot: 0.01,
            lot_step: 0.01,
            max_lot: Some(1.0),
            contract_value: Micros::new(100_000 * tle_money::MICROS_PER_UNIT),
            spread: tle_money::price_to_micros(0.0001).unwrap(),
            trade_mode: TradeMode::Full,
            stops_level: tle_money::price_to_micros(0.0005).unwrap(),
            price_step: tle_money::price_to_micros(0.00001).unwrap(),
        }
    }

    fn audit_writer() -> Mutex<AuditWriter> {
        let mut p = std::env::temp_dir();
        p.push(format!("tle-entry-bypass-test-{}.jsonl", uuid::Uuid::new_v4()));
        Mutex::new(AuditWriter::new(p, false).unwrap())
    }

    fn position_in_sweet_spot(entry: f64, current: f64) -> Position {
        Position {
            ticket: Ticket::new(1),
            symbol: "EURUSD".to_string(),
            direction: Direction::Long,
            entry_price: tle_money::price_to_micros(entry).unwrap(),
            volume: 0.01,
            current_price: tle_money::price_to_micros(current).unwrap(),
            current_sl: Some(tle_money::price_to_micros(entry).unwrap()),
            opened_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn micro_profit_closure_closes_protected_position_in_band() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        let info = symbol_info();
        broker.set_symbol(info.clone());

        // $0.05 profit on 0.01 lots / $100k contract => 0.00005 price move.
        let pos = position_in_sweet_spot(1.10000, 1.10050);
        broker.seed_position(pos.clone());
        broker.set_quote(
            "EURUSD",
            Quote {
                bid: pos.current_price,
                ask: pos.current_price + info.spread,
                ts: Utc::now(),
            },
        );

        let registry = PositionRegistry::new();
        let mut state = SlState::initial(pos.entry_price, pos.opened_at);
        state.last_applied_reason = SlReason::SweetSpot;
        registry.record_fill(pos.clone(), state);

        let symbols = SymbolCache::new();
        symbols.refresh(vec![info]);
        let audit = audit_writer();
        let cfg = Config::sane_defaults();

        let results = scan_micro_profit_closures(&registry, &broker, &symbols, &audit, &cfg, uuid::Uuid::nil());
        assert_eq!(results.len(), 1);
        match &results[0].1 {
            ClosureOutcome::Closed { .. } => {}
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(registry.get(pos.ticket).is_none());
    }

    #[test]
    fn micro_profit_closure_skips_strict_loss_state() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        let info = symbol_info();
        broker.set_symbol(info.clone());

        let pos = position_in_sweet_spot(1.10000, 1.10050);
        broker.seed_position(pos.clone());

        let registry = PositionRegistry::new();
        registry.record_fill(pos.clone(), SlState::initial(pos.entry_price, pos.opened_at));

        let symbols = SymbolCache::new();
        symbols.refresh(vec![info]);
        let audit = audit_writer();
        let cfg = Config::sane_defaults();

        let results = scan_micro_profit_closures(&registry, &broker, &symbols, &audit, &cfg, uuid::Uuid::nil());
        assert_eq!(results, vec![(pos.ticket, ClosureOutcome::Skipped)]);
        assert!(registry.get(pos.ticket).is_some());
    }

    struct AlwaysCompliant;
    impl CompliancePredicate for AlwaysCompliant {
        fn evaluate(&self, _position: &Position, _now: DateTime<Utc>) -> Option<String> {
            Some("OVERNIGHT_HOLD".to_string())
        }
    }

    #[test]
    fn compliance_closure_closes_regardless_of_profit() {
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let broker = SimBroker::new(clock.clone());
        let info = symbol_info();
        broker.set_symbol(info.clone());

        // Losing position: compliance bypass must still close it.
        let pos = position_in_sweet_spot(1.10000, 1.09000);
        broker.seed_position(pos.clone());

        let registry = PositionRegistry::new();
        registry.record_fill(pos.clone(), SlState::initial(pos.entry_price, pos.opened_at));

        let symbols = SymbolCache::new();
        symbols.refresh(vec![info]);
        let audit = audit_writer();
        let predicate = AlwaysCompliant;

        let results = scan_compliance_closures(&registry, &broker, &symbols, &audit, &predicate, Utc::now(), uuid::Uuid::nil());
        match &results[0].1 {
            ClosureOutcome::Closed { reason, .. } => assert_eq!(reason, "COMPLIANCE_OVERNIGHT_HOLD"),
            other => panic!("expected Closed, got {other:?}"),
        }
        assert!(registry.get(pos.ticket).is_none());
    }
}
