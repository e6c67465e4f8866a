use std::collections::HashMap;
use std::sync::Mutex;

use tle_schemas::Ticket;

/// Tracks, per ticket, how long verification has been continuously failing.
/// A ticket crossing `disabled_after_minutes` is reported DISABLED and
/// requires an explicit operator `reset` — the engine does not clear this
/// on its own, since repeated verification failure past that horizon means
/// the broker's reported SL and the engine's belief have diverged in a way
/// routine retries have not resolved.
pub struct DisabledTracker {
    disabled_after_ms: i64,
    first_failure_at_ms: Mutex<HashMap<Ticket, i64>>,
}

impl DisabledTracker {
    pub fn new(disabled_after_minutes: i64) -> Self {
        Self {
            disabled_after_ms: disabled_after_minutes.max(0) * 60_000,
            first_failure_at_ms: Mutex::new(HashMap::new()),
        }
    }

    /// Records a verification failure for `ticket` at `now_ms`. Call
    /// [`Self::record_success`] to clear the streak once verification
    /// succeeds again.
    pub fn record_failure(&self, ticket: Ticket, now_ms: i64) {
        self.first_failure_at_ms
            .lock()
            .expect("disabled tracker mutex poisoned")
            .entry(ticket)
            .or_insert(now_ms);
    }

    pub fn record_success(&self, ticket: Ticket) {
        self.first_failure_at_ms
            .lock()
            .expect("disabled tracker mutex poisoned")
            .remove(&ticket);
    }

    /// `true` if `ticket` has been continuously failing verification for
    /// longer than the configured horizon.
    pub fn is_disabled(&self, ticket: Ticket, now_ms: i64) -> bool {
        self.first_failure_at_ms
            .lock()
            .expect("disabled tracker mutex poisoned")
            .get(&ticket)
            .map(|&first| now_ms - first > self.disabled_after_ms)
            .unwrap_or(false)
    }

    /// Operator reset: clears the failure streak so the ticket is no longer
    /// reported DISABLED and normal retries resume.
    pub fn reset(&self, ticket: Ticket) {
        self.first_failure_at_ms
            .lock()
            .expect("disabled tracker mutex poisoned")
            .remove(&ticket);
    }

    pub fn disabled_tickets(&self, now_ms: i64) -> Vec<Ticket> {
        self.first_failure_at_ms
            .lock()
            .expect("disabled tracker mutex poisoned")
            .iter()
            .filter(|(_, &first)| now_ms - first > self.disabled_after_ms)
            .map(|(&t, _)| t)
            .collect()
    }
}
