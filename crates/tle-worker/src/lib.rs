//! The four concurrent agents of §5: the scan loop, the SL worker (with the
//! P3 early-exit bypasses folded into its tick), the position monitor, and
//! the lock watchdog. Each is a single `tokio` task on its own interval;
//! none busy-waits, and every suspension point (broker call, lock
//! acquisition, RPC token wait) is a genuine await or a bounded blocking
//! call run via `spawn_blocking`.

mod monitor;
mod scan;
mod sl_worker;
mod watchdog;

pub use monitor::spawn_position_monitor;
pub use scan::{spawn_scan_loop, MarketContext, NewsSource, SignalSource};
pub use sl_worker::spawn_sl_worker;
pub use watchdog::spawn_lock_watchdog;

use std::sync::Arc;
use std::time::Duration;

use tle_entry::CompliancePredicate;
use tle_runtime::Runtime;

/// Handles for the four spawned agents, returned by [`spawn_all`] so the
/// caller (the daemon's `main`) can drain them on shutdown.
pub struct WorkerHandles {
    scan: tokio::task::JoinHandle<()>,
    sl_worker: tokio::task::JoinHandle<()>,
    monitor: tokio::task::JoinHandle<()>,
    watchdog: tokio::task::JoinHandle<()>,
}

impl WorkerHandles {
    /// Gives every task `shutdown_drain_ms` to finish its current tick
    /// (in-flight broker calls, lock releases), then aborts whatever is
    /// still running. Remaining ticket locks are left to the watchdog's own
    /// force-release path, since aborting this task does not reach into
    /// `tle-locktable` directly.
    pub async fn shutdown(self, drain: Duration) {
        tokio::time::sleep(drain).await;
        self.scan.abort();
        self.sl_worker.abort();
        self.monitor.abort();
        self.watchdog.abort();
    }
}

/// Spawns all four agents against one shared [`Runtime`]. The caller
/// supplies the pluggable external collaborators (§1): a signal source, a
/// market-hours/bar-feed context, a news source, and a compliance
/// predicate for P3(b).
pub fn spawn_all(
    runtime: Arc<Runtime>,
    signals: Arc<dyn SignalSource>,
    market: Arc<dyn MarketContext>,
    news: Arc<dyn NewsSource>,
    compliance: Arc<dyn CompliancePredicate>,
) -> WorkerHandles {
    WorkerHandles {
        scan: spawn_scan_loop(runtime.clone(), signals, market, news),
        sl_worker: spawn_sl_worker(runtime.clone(), compliance),
        monitor: spawn_position_monitor(runtime.clone()),
        watchdog: spawn_lock_watchdog(runtime),
    }
}

/// A compliance predicate that never fires, for deployments with no
/// overnight-hold or similar external rule configured.
pub struct NeverCompliant;
impl CompliancePredicate for NeverCompliant {
    fn evaluate(&self, _position: &tle_schemas::Position, _now: chrono::DateTime<chrono::Utc>) -> Option<String> {
        None
    }
}
