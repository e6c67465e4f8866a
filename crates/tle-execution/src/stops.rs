//! Broker stops-level enforcement (§4.6 step 8): the broker rejects any
//! SL/TP placed closer to the current price than `stops_level + spread`.
//! When a proposed target is too close, the only valid adjustment that does
//! not regress monotonicity is to push the SL further onto the protective
//! side of the current price — which means accepting slightly more loss
//! than `max_risk_per_trade_usd` intended, not less protection than
//! `last_applied_sl` already committed to.

use tle_money::Micros;
use tle_schemas::Direction;

/// Returns the SL to actually submit to the broker, or `None` if no price
/// satisfies both the stops-level distance and the monotonicity floor
/// (`last_applied_sl`) simultaneously — the caller must return
/// `BROKER_CONSTRAINT` in that case.
pub fn enforce_stops_level(
    direction: Direction,
    current_price: Micros,
    target_sl: Micros,
    min_distance: Micros,
    last_applied_sl: Micros,
) -> Option<Micros> {
    let widened = match direction {
        Direction::Long => {
            let ceiling = current_price.saturating_sub(min_distance);
            if target_sl <= ceiling {
                target_sl
            } else {
                ceiling
            }
        }
        Direction::Short => {
            let floor = current_price + min_distance;
            if target_sl >= floor {
                target_sl
            } else {
                floor
            }
        }
    };

    let ok = match direction {
        Direction::Long => widened >= last_applied_sl,
        Direction::Short => widened <= last_applied_sl,
    };

    ok.then_some(widened)
}
