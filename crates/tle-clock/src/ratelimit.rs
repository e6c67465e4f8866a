use crate::Clock;
use std::sync::Mutex;

/// Continuously-refilling token bucket shared by every SL-application call.
/// Capacity equals the configured rate, so bursts up to one second's worth
/// of calls are absorbed before throttling kicks in. `try_acquire` never
/// blocks the caller — an exhausted bucket means the caller aborts this
/// attempt and records a rate-limited skip, it does not wait for a token.
pub struct RateLimiter {
    capacity: f64,
    refill_per_ms: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill_ms: i64,
}

impl RateLimiter {
    pub fn new(rate_per_sec: u32, start_monotonic_ms: i64) -> Self {
        let capacity = rate_per_sec.max(1) as f64;
        Self {
            capacity,
            refill_per_ms: capacity / 1000.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill_ms: start_monotonic_ms,
            }),
        }
    }

    /// Attempts to take one token. Returns `true` if acquired.
    pub fn try_acquire(&self, clock: &dyn Clock) -> bool {
        let now = clock.monotonic_ms();
        let mut s = self.state.lock().expect("rate limiter mutex poisoned");

        let elapsed = (now - s.last_refill_ms).max(0);
        if elapsed > 0 {
            s.tokens = (s.tokens + elapsed as f64 * self.refill_per_ms).min(self.capacity);
            s.last_refill_ms = now;
        }

        if s.tokens >= 1.0 {
            s.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FakeClock;

    #[test]
    fn exhausts_then_refills_over_time() {
        let clock = FakeClock::new(0);
        let limiter = RateLimiter::new(2, clock.now_ms());

        assert!(limiter.try_acquire(&clock));
        assert!(limiter.try_acquire(&clock));
        assert!(!limiter.try_acquire(&clock), "bucket should be empty at capacity 2");

        clock.advance_ms(500);
        assert!(limiter.try_acquire(&clock), "half a second at rate 2/s refills one token");
        assert!(!limiter.try_acquire(&clock));
    }

    #[test]
    fn never_exceeds_capacity() {
        let clock = FakeClock::new(0);
        let limiter = RateLimiter::new(5, clock.now_ms());
        clock.advance_ms(10_000);
        for _ in 0..5 {
            assert!(limiter.try_acquire(&clock));
        }
        assert!(!limiter.try_acquire(&clock));
    }
}
