use std::collections::HashMap;
use std::sync::Mutex;

/// Per-ticket minimum-interval gate. Tracks `last_attempt_at` per key and
/// allows at most one pass through per `min_interval_ms`, independent of the
/// global [`crate::RateLimiter`] which is shared across all tickets.
pub struct Throttle {
    min_interval_ms: i64,
    last_attempt_ms: Mutex<HashMap<u64, i64>>,
}

impl Throttle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms: min_interval_ms as i64,
            last_attempt_ms: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records `now_ms` if the key has not been seen
    /// within `min_interval_ms`. Returns `false` without recording if the
    /// caller is still inside the throttle window.
    pub fn check_and_record(&self, key: u64, now_ms: i64) -> bool {
        let mut map = self.last_attempt_ms.lock().expect("throttle mutex poisoned");
        match map.get(&key) {
            Some(&last) if now_ms - last < self.min_interval_ms => false,
            _ => {
                map.insert(key, now_ms);
                true
            }
        }
    }

    pub fn last_attempt_ms(&self, key: u64) -> Option<i64> {
        self.last_attempt_ms
            .lock()
            .expect("throttle mutex poisoned")
            .get(&key)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_within_window_then_allows_after() {
        let throttle = Throttle::new(100);
        assert!(throttle.check_and_record(7, 1_000));
        assert!(!throttle.check_and_record(7, 1_050));
        assert!(throttle.check_and_record(7, 1_101));
    }

    #[test]
    fn tracks_tickets_independently() {
        let throttle = Throttle::new(100);
        assert!(throttle.check_and_record(1, 1_000));
        assert!(throttle.check_and_record(2, 1_000));
        assert!(!throttle.check_and_record(1, 1_050));
        assert!(!throttle.check_and_record(2, 1_050));
    }
}
