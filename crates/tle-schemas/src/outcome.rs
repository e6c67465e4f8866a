use serde::{Deserialize, Serialize};
use tle_money::Micros;

use crate::SlReason;

/// Tagged result of `update_sl_atomic`. Every variant is an expected,
/// non-exceptional control-flow outcome — no panics or exceptions for
/// conditions this table anticipates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    NoPosition,
    CircuitOpen,
    Throttled,
    LockTimeout,
    NoUpdate,
    NonMonotonic,
    BrokerConstraint,
    RateLimited,
    ApplyFailed { failure_reason: String, attempts: u32 },
    VerificationFailed,
    EmergencyApplied { applied_sl: Micros },
    Ok { applied_sl: Micros, reason: SlReason },
}

impl ApplyOutcome {
    /// Stable string code matching the disposition table, used in audit
    /// records and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ApplyOutcome::NoPosition => "NO_POSITION",
            ApplyOutcome::CircuitOpen => "CIRCUIT_OPEN",
            ApplyOutcome::Throttled => "THROTTLED",
            ApplyOutcome::LockTimeout => "LOCK_TIMEOUT",
            ApplyOutcome::NoUpdate => "NO_UPDATE",
            ApplyOutcome::NonMonotonic => "NON_MONOTONIC",
            ApplyOutcome::BrokerConstraint => "BROKER_CONSTRAINT",
            ApplyOutcome::RateLimited => "RATE_LIMITED",
            ApplyOutcome::ApplyFailed { .. } => "APPLY_FAILED",
            ApplyOutcome::VerificationFailed => "VERIFICATION_FAILED",
            ApplyOutcome::EmergencyApplied { .. } => "EMERGENCY_APPLIED",
            ApplyOutcome::Ok { .. } => "OK",
        }
    }

    /// `true` for outcomes that represent a successfully applied SL (OK or
    /// the emergency path), used by callers deciding whether to bump
    /// `version` / re-read state.
    pub fn applied(&self) -> bool {
        matches!(self, ApplyOutcome::Ok { .. } | ApplyOutcome::EmergencyApplied { .. })
    }
}
