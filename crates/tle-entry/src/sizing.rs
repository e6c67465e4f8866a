use std::sync::{Arc, Mutex};

use tle_audit::{AuditWriter, SlAttemptRecord};
use tle_broker::{BrokerAdapter, BrokerError, PlaceResult};
use tle_config::Config;
use tle_money::Micros;
use tle_registry::PositionRegistry;
use tle_schemas::{Direction, Position, SlState, SymbolInfo, Ticket};

/// Outcome of one P2 entry attempt. Every variant is an expected,
/// non-exceptional control-flow result — same discipline as C2's
/// `ApplyOutcome` (§7).
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Placed, registered, and given an initial STRICT_LOSS stop.
    Placed { ticket: Ticket, volume: f64, entry_price: Micros, initial_sl: Micros },
    /// `min_lot(symbol) > max_lot_cap`: the symbol is skipped entirely.
    SkippedLotTooLarge,
    Rejected { reason: String },
    BrokerError(String),
}

/// Chooses the lot size per §4.11: start from `default_lot`; if the broker's
/// minimum lot for the symbol exceeds it, step up to that minimum (capped at
/// `max_lot_cap`); if even the minimum exceeds the cap, the symbol cannot be
/// traded at the configured risk budget and is skipped.
fn determine_lot_size(symbol_info: &SymbolInfo, config: &Config) -> Option<f64> {
    if symbol_info.min_lot > config.max_lot_cap {
        return None;
    }
    Some(symbol_info.min_lot.max(config.default_lot).min(config.max_lot_cap))
}

/// Computes the SL price that caps the loss at `max_risk_per_trade_usd` for
/// the given hypothetical fill, then widens it to the nearest broker-valid
/// protective distance if the ideal price is inside the stops-level. There
/// is no prior applied SL to stay on the protective side of at entry time,
/// so (unlike `tle_execution::stops::enforce_stops_level`) widening here
/// only ever needs to satisfy the distance constraint.
///
/// Returns `(sl_price, widened)`; `widened` is `true` when the loss cap may
/// be slightly exceeded because of stops-level widening (§4.11, §8 I1).
fn initial_sl_price(
    direction: Direction,
    entry_price: Micros,
    volume: f64,
    symbol_info: &SymbolInfo,
    config: &Config,
) -> (Micros, bool) {
    let synthetic = Position {
        ticket: Ticket::new(0),
        symbol: symbol_info.symbol.clone(),
        direction,
        entry_price,
        volume,
        current_price: entry_price,
        current_sl: None,
        opened_at: chrono::Utc::now(),
        version: 0,
    };
    let ideal_sl = synthetic.sl_price_for_profit(-config.max_risk_per_trade_usd, symbol_info.contract_value);

    let min_distance = symbol_info.stops_level + symbol_info.spread;
    let distance = (entry_price.raw() - ideal_sl.raw()).abs();
    if Micros::new(distance) >= min_distance {
        return (ideal_sl, false);
    }

    let widened = match direction {
        Direction::Long => entry_price.saturating_sub(min_distance),
        Direction::Short => entry_price + min_distance,
    };
    (widened, true)
}

/// Places a market order for `candidate_direction`/`volume` per §4.11 and,
/// on any fill (full or partial), registers the resulting ticket in the
/// position registry with its initial STRICT_LOSS state. Never places an
/// order with no SL (§7: "the system never trades with a missing SL").
#[allow(clippy::too_many_arguments)]
pub fn place_entry(
    broker: &dyn BrokerAdapter,
    registry: &PositionRegistry,
    audit: &Mutex<AuditWriter>,
    config: &Config,
    run_id: uuid::Uuid,
    symbol: &str,
    symbol_info: &SymbolInfo,
    direction: Direction,
) -> EntryOutcome {
    let Some(volume) = determine_lot_size(symbol_info, config) else {
        return EntryOutcome::SkippedLotTooLarge;
    };

    let quote = match broker.get_quote(symbol) {
        Ok(q) => q,
        Err(e) => return EntryOutcome::BrokerError(format!("{e:?}")),
    };
    let estimated_entry = quote.close_price(direction);
    let (sl_price, widened) = initial_sl_price(direction, estimated_entry, volume, symbol_info, config);
    if widened {
        tracing::warn!(symbol, "entry SL widened past stops-level; loss cap may be exceeded (I1 slack)");
    }

    let place_result = broker.place_order(symbol, direction, volume, sl_price, None);
    let (ticket, actual_volume, actual_price) = match place_result {
        Ok(PlaceResult::Filled { ticket, actual_volume, actual_price })
        | Ok(PlaceResult::Partial { ticket, actual_volume, actual_price }) => (ticket, actual_volume, actual_price),
        Ok(PlaceResult::Rejected { reason }) => return EntryOutcome::Rejected { reason },
        Err(BrokerError::Stale) => return EntryOutcome::BrokerError("STALE_QUOTE".to_string()),
        Err(BrokerError::Unavailable(msg)) => return EntryOutcome::BrokerError(msg),
    };

    let now = chrono::Utc::now();
    let position = Position {
        ticket,
        symbol: symbol.to_string(),
        direction,
        entry_price: actual_price,
        volume: actual_volume,
        current_price: actual_price,
        current_sl: Some(sl_price),
        opened_at: now,
        version: 0,
    };
    let sl_state = SlState::initial(sl_price, now);
    registry.record_fill(position, sl_state);

    let mut writer = audit.lock().expect("audit writer mutex poisoned");
    let payload = SlAttemptRecord {
        timestamp: now,
        ticket: ticket.raw(),
        symbol: symbol.to_string(),
        direction: direction.to_string(),
        entry: actual_price,
        current_price: actual_price,
        profit_usd: Micros::ZERO,
        target_sl: Some(sl_price),
        applied_sl: Some(sl_price),
        reason: tle_schemas::SlReason::StrictLoss.to_string(),
        success: true,
        failure_reason: None,
        attempts: 1,
        duration_ms: 0,
    }
    .into_payload();
    if let Err(e) = writer.append(run_id, "sl_attempt", "ENTRY_INITIAL_SL", payload) {
        tracing::warn!(error = ?e, "failed to append entry audit record");
    }

    EntryOutcome::Placed {
        ticket,
        volume: actual_volume,
        entry_price: actual_price,
        initial_sl: sl_price,
    }
}
