use tle_config::Config;
use tle_money::Micros;
use tle_schemas::{Position, SlReason, SlState};

use crate::types::SlProposal;

/// Hardcoded in §4.5 rule 3 ("if `peak_profit_usd ≥ 1.0`") rather than
/// exposed as a config knob — §6's configuration table does not list it.
const PEAK_CAP_ACTIVATION_USD: i64 = 1_000_000;

/// Pure computation per §4.5. `contract_value` is the opaque
/// broker-supplied conversion factor (Open Question 1); the caller reads it
/// off `SymbolInfo` for `position.symbol`.
pub fn compute_target_sl(
    position: &Position,
    current_profit_usd: Micros,
    state: &SlState,
    config: &Config,
    contract_value: Micros,
) -> SlProposal {
    // Rule 1: STRICT_LOSS. Does not reference peak-profit state.
    if current_profit_usd.is_negative() {
        let target_profit = -config.max_risk_per_trade_usd;
        let target_sl = position.sl_price_for_profit(target_profit, contract_value);
        return SlProposal::Apply {
            target_sl,
            reason: SlReason::StrictLoss,
            peak_profit_usd: state.peak_profit_usd,
        };
    }

    // Rule 2: SWEET_SPOT. Immediate break-even lock, no wait for a
    // specific "crossed zero" event.
    if current_profit_usd >= config.sweet_spot_min_usd && current_profit_usd <= config.sweet_spot_max_usd {
        return SlProposal::Apply {
            target_sl: position.entry_price,
            reason: SlReason::SweetSpot,
            peak_profit_usd: state.peak_profit_usd,
        };
    }

    // Rule 3: TRAILING.
    if current_profit_usd > config.sweet_spot_max_usd {
        let peak = max_micros(state.peak_profit_usd, current_profit_usd);

        let floor_lock = floor_lock_usd(current_profit_usd, config.trailing_increment_usd);
        let allowed_pullback = scale_micros(peak, config.pullback_tolerance_pct);
        let mut elastic_lock = max_micros(floor_lock, peak.saturating_sub(allowed_pullback));

        let jump = current_profit_usd.saturating_sub(state.last_applied_profit_usd);
        if jump >= config.big_jump_threshold_usd {
            elastic_lock = peak.saturating_sub(config.big_jump_lock_margin_usd);
        }

        if peak.raw() >= PEAK_CAP_ACTIVATION_USD {
            elastic_lock = max_micros(elastic_lock, config.max_peak_lock_usd);
        }

        let target_sl = position.sl_price_for_profit(elastic_lock, contract_value);
        return SlProposal::Apply {
            target_sl,
            reason: SlReason::Trailing,
            peak_profit_usd: peak,
        };
    }

    // Rule 4: profit in [0, sweet_spot_min_usd).
    SlProposal::NoUpdate
}

fn max_micros(a: Micros, b: Micros) -> Micros {
    if a >= b {
        a
    } else {
        b
    }
}

/// `floor(profit / increment) * increment - increment`, computed on the raw
/// micros integers: both operands share the same 1e-6 scale so it cancels
/// out of the ratio, leaving a plain step count.
fn floor_lock_usd(profit: Micros, increment: Micros) -> Micros {
    if increment.raw() <= 0 {
        return Micros::ZERO;
    }
    let steps = profit.raw().div_euclid(increment.raw());
    Micros::new(steps * increment.raw()) - increment
}

fn scale_micros(amount: Micros, pct: f64) -> Micros {
    Micros::new((amount.raw() as f64 * pct).round() as i64)
}
