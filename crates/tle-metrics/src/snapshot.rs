use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Aggregated engine metrics. Every field is an atomically-updated counter;
/// `snapshot()` reads a consistent-enough view for a periodic report (exact
/// cross-counter atomicity is not required — these are monitoring numbers,
/// not safety invariants).
#[derive(Default)]
pub struct Metrics {
    update_attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    emergency_invocations: AtomicU64,
    rate_limited_skips: AtomicU64,
    lock_timeouts: AtomicU64,
    lock_acquisitions: AtomicU64,
    verification_failures: AtomicU64,
    circuit_breaker_trips: AtomicU64,
    slow_iterations: AtomicU64,
    /// Profit-lock activation latency samples, in ms from position open to
    /// the first SWEET_SPOT/TRAILING apply. Bounded to avoid unbounded
    /// growth over a long-running process; old samples are dropped.
    activation_times_ms: Mutex<Vec<u64>>,
}

const MAX_ACTIVATION_SAMPLES: usize = 10_000;

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update_attempt(&self) {
        self.update_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emergency_invocation(&self) {
        self.emergency_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_attempt(&self, timed_out: bool) {
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_verification_failure(&self) {
        self.verification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow_iteration(&self) {
        self.slow_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_activation_time_ms(&self, ms: u64) {
        let mut samples = self.activation_times_ms.lock().expect("activation samples mutex poisoned");
        if samples.len() >= MAX_ACTIVATION_SAMPLES {
            samples.remove(0);
        }
        samples.push(ms);
    }

    /// Fraction of lock acquisitions that timed out, in `[0, 1]`. Target
    /// per §4.9 is < 5%.
    pub fn lock_contention_rate(&self) -> f64 {
        let attempts = self.lock_acquisitions.load(Ordering::Relaxed);
        if attempts == 0 {
            return 0.0;
        }
        self.lock_timeouts.load(Ordering::Relaxed) as f64 / attempts as f64
    }

    /// Fraction of update attempts that succeeded, in `[0, 1]`. Target per
    /// §4.9 is > 95%.
    pub fn success_rate(&self) -> f64 {
        let attempts = self.update_attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 1.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / attempts as f64
    }

    /// Mean profit-lock activation time in ms. Target per §4.9 is < 500.
    pub fn mean_activation_time_ms(&self) -> f64 {
        let samples = self.activation_times_ms.lock().expect("activation samples mutex poisoned");
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<u64>() as f64 / samples.len() as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            update_attempts: self.update_attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            success_rate: self.success_rate(),
            emergency_invocations: self.emergency_invocations.load(Ordering::Relaxed),
            rate_limited_skips: self.rate_limited_skips.load(Ordering::Relaxed),
            lock_contention_rate: self.lock_contention_rate(),
            verification_failures: self.verification_failures.load(Ordering::Relaxed),
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
            slow_iterations: self.slow_iterations.load(Ordering::Relaxed),
            mean_activation_time_ms: self.mean_activation_time_ms(),
        }
    }
}

/// Point-in-time read of [`Metrics`], suitable for JSON serialization over
/// the daemon's `/v1/metrics` surface and for the periodic audit snapshot.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub update_attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub emergency_invocations: u64,
    pub rate_limited_skips: u64,
    pub lock_contention_rate: f64,
    pub verification_failures: u64,
    pub circuit_breaker_trips: u64,
    pub slow_iterations: u64,
    pub mean_activation_time_ms: f64,
}
