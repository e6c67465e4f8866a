use std::sync::Arc;
use std::time::Duration;

use tle_runtime::Runtime;

/// Spawns the lock watchdog (§5 agent iv): every `lock_watchdog_interval_ms`,
/// force-releases any ticket lock held past `max_hold_time_ms` and reclaims
/// lock-table entries for tickets no longer tracked by the registry.
pub fn spawn_lock_watchdog(runtime: Arc<Runtime>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(runtime.config.lock_watchdog_interval_ms));
        loop {
            ticker.tick().await;
            let events = runtime.locks.sweep_stale(runtime.config.max_hold_time_ms as i64, &*runtime.clock);
            for event in &events {
                tracing::warn!(ticket = event.ticket.raw(), holder = %event.holder, held_ms = event.held_ms, "lock watchdog force-released stale lock");
            }
            let registry = runtime.registry.clone();
            runtime.locks.reclaim_absent(|ticket| registry.get(ticket).is_some());
        }
    })
}
