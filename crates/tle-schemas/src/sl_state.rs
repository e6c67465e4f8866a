use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tle_money::Micros;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlReason {
    StrictLoss,
    SweetSpot,
    Trailing,
    Emergency,
}

impl std::fmt::Display for SlReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SlReason::StrictLoss => "STRICT_LOSS",
            SlReason::SweetSpot => "SWEET_SPOT",
            SlReason::Trailing => "TRAILING",
            SlReason::Emergency => "EMERGENCY",
        };
        write!(f, "{s}")
    }
}

/// Per-ticket protective-stop bookkeeping, owned by the SL application
/// engine and mutated only while holding that ticket's lock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlState {
    pub peak_profit_usd: Micros,
    pub last_applied_sl: Micros,
    pub last_applied_reason: SlReason,
    pub last_applied_profit_usd: Micros,
    pub last_attempt_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub circuit_open_until: Option<DateTime<Utc>>,
    pub sweet_spot_entered_at: Option<DateTime<Utc>>,
    pub verification_pending: bool,
}

impl SlState {
    /// Initial state for a freshly opened position, whose first SL is always
    /// the STRICT_LOSS price computed at entry.
    pub fn initial(initial_sl: Micros, opened_at: DateTime<Utc>) -> Self {
        Self {
            peak_profit_usd: Micros::ZERO,
            last_applied_sl: initial_sl,
            last_applied_reason: SlReason::StrictLoss,
            last_applied_profit_usd: Micros::ZERO,
            last_attempt_at: opened_at,
            consecutive_failures: 0,
            circuit_open_until: None,
            sweet_spot_entered_at: None,
            verification_pending: false,
        }
    }

    pub fn is_circuit_open(&self, now: DateTime<Utc>) -> bool {
        self.circuit_open_until.map(|until| now < until).unwrap_or(false)
    }

    /// Once an apply has graduated past STRICT_LOSS, the reason must never
    /// regress back to it.
    pub fn has_entered_protection(&self) -> bool {
        !matches!(self.last_applied_reason, SlReason::StrictLoss)
    }
}
