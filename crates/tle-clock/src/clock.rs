use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Time source injected into every component that needs to reason about
/// deadlines, intervals, or wall-clock comparisons. Generalizes the
/// closure-injected `Fn() -> i64` clock idiom into a shared, object-safe
/// trait so registry/lock table/worker/risk state can all hold the same
/// `Arc<dyn Clock>` without threading a type parameter through each of them.
///
/// `now_ms` is wall-clock (epoch milliseconds UTC) — used for logs and for
/// news/market-close window comparisons, where an absolute timestamp is
/// required. `monotonic_ms` is a monotonic source unaffected by NTP
/// adjustments or system clock changes — used for all interval arithmetic
/// (throttle windows, lock timeouts, circuit breaker cooloffs).
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
    fn monotonic_ms(&self) -> i64;
}

/// Production clock: wall-clock from `chrono::Utc::now`, monotonic time from
/// `std::time::Instant` anchored at construction.
pub struct SystemClock {
    started_at: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn monotonic_ms(&self) -> i64 {
        self.started_at.elapsed().as_millis() as i64
    }
}

/// Deterministic clock for tests: both `now_ms` and `monotonic_ms` are
/// driven by the same manually-advanced counter, so scenarios can assert
/// exact interval boundaries without real sleeps.
pub struct FakeClock {
    millis: AtomicI64,
}

impl FakeClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_ms),
        }
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_ms(&self, value_ms: i64) {
        self.millis.store(value_ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn monotonic_ms(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 1_250);
        assert_eq!(clock.monotonic_ms(), 1_250);
    }

    #[test]
    fn system_clock_monotonic_never_decreases() {
        let clock = SystemClock::new();
        let a = clock.monotonic_ms();
        let b = clock.monotonic_ms();
        assert!(b >= a);
    }
}
