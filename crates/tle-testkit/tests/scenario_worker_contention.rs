//! S4 (§8): lock contention stress, driven through the real
//! `spawn_sl_worker`/`spawn_lock_watchdog` tasks rather than direct
//! `update_sl_atomic` calls, so the scenario exercises the actual
//! concurrent agents (§5 agents ii and iv) an adversary thread would
//! contend with in production.

use std::sync::Arc;
use std::time::Duration;

use tle_schemas::{LockKind, SlReason};
use tle_testkit::{fast_config, ScenarioHarness};
use tle_worker::NeverCompliant;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn s4_lock_contention_recovers_without_deadlock_or_regression() {
    let mut cfg = fast_config();
    cfg.worker_interval_ms = 50; // validate()'s floor
    cfg.lock_timeout_ms_normal = 50;
    cfg.lock_timeout_ms_profit_locking = 80;
    let harness = ScenarioHarness::new(cfg);
    let ticket = harness.open_long();
    harness.set_profit_usd(ticket, 0.02);

    let runtime = harness.runtime.clone();
    let worker = tle_worker::spawn_sl_worker(runtime.clone(), Arc::new(NeverCompliant));
    let watchdog = tle_worker::spawn_lock_watchdog(runtime.clone());

    // An adversary holds the ticket lock for 200ms, well past either lock
    // timeout, forcing at least one worker tick to miss its apply.
    let locks = runtime.locks.clone();
    let clock = runtime.clock.clone();
    let adversary = tokio::task::spawn_blocking(move || {
        std::thread::sleep(Duration::from_millis(15));
        let _guard = locks
            .try_acquire(ticket, LockKind::Normal, 2_000, &*clock, "adversary")
            .expect("adversary must win the race for the lock");
        std::thread::sleep(Duration::from_millis(200));
    });

    for profit in [0.02_f64, 0.04, 0.06, 0.08, 0.10, 0.12] {
        harness.set_profit_usd(ticket, profit);
        tokio::time::sleep(Duration::from_millis(40)).await;
    }

    adversary.await.expect("adversary task must not panic");
    // Give the worker a couple more ticks to recover once the lock frees up.
    tokio::time::sleep(Duration::from_millis(150)).await;

    worker.abort();
    watchdog.abort();

    let state = harness.sl_state(ticket);
    assert!(
        state.consecutive_failures <= 1,
        "contention alone must not trip the failure counter, got {}",
        state.consecutive_failures
    );
    assert!(runtime.locks.is_free(ticket), "no lock should be left held after the worker tasks are aborted");
    assert_ne!(
        state.last_applied_reason,
        SlReason::StrictLoss,
        "despite the contention, profit climbing through the sweet spot must still end up protected"
    );
}
