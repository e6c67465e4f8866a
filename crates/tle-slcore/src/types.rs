use tle_money::Micros;
use tle_schemas::SlReason;

/// Output of [`crate::compute_target_sl`]. `NoUpdate` covers both "profit is
/// below the sweet spot" (§4.5 rule 4) and the monotonicity/throttle/circuit
/// conditions that live in the caller rather than here.
#[derive(Clone, Debug, PartialEq)]
pub enum SlProposal {
    NoUpdate,
    Apply {
        target_sl: Micros,
        reason: SlReason,
        /// The high-water mark as of this computation; `STRICT_LOSS` and
        /// `SWEET_SPOT` pass the prior value through unchanged, `TRAILING`
        /// updates it to `max(peak, current_profit)`.
        peak_profit_usd: Micros,
    },
}
