//! Fatal-condition latch (§7: "Fatal conditions ... are surfaced as a
//! kill-switch activation that stops the scan loop and attempts graceful
//! shutdown; the SL worker continues until all positions are accounted for").
//!
//! A sticky latch: once tripped, a `KillSwitch` never silently clears
//! itself. An operator must call [`KillSwitch::reset`] explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Why the kill switch tripped. Only the two fatal conditions §7 names:
/// a permanently lost broker connection, or a configuration invariant
/// violated at startup/reload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub enum KillSwitchReason {
    BrokerConnectionLost,
    ConfigInvariantViolated,
    /// Operator-initiated, e.g. via the daemon's manual disarm endpoint.
    Manual,
}

impl std::fmt::Display for KillSwitchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KillSwitchReason::BrokerConnectionLost => "BROKER_CONNECTION_LOST",
            KillSwitchReason::ConfigInvariantViolated => "CONFIG_INVARIANT_VIOLATED",
            KillSwitchReason::Manual => "MANUAL",
        };
        write!(f, "{s}")
    }
}

/// Sticky latch: the scan loop checks [`Self::is_tripped`] before every
/// cycle and stops placing new entries once tripped; the SL worker ignores
/// it and keeps draining existing positions per §7.
#[derive(Default)]
pub struct KillSwitch {
    tripped: AtomicBool,
    reason: RwLock<Option<KillSwitchReason>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self, reason: KillSwitchReason) {
        tracing::error!(reason = %reason, "KILL_SWITCH_TRIPPED");
        *self.reason.write().expect("kill switch reason lock poisoned") = Some(reason);
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<KillSwitchReason> {
        self.reason.read().expect("kill switch reason lock poisoned").clone()
    }

    /// Operator reset. Does not re-validate the underlying condition; the
    /// caller is asserting it has been addressed.
    pub fn reset(&self) {
        *self.reason.write().expect("kill switch reason lock poisoned") = None;
        self.tripped.store(false, Ordering::SeqCst);
    }
}
