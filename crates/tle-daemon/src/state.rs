//! Shared runtime state for the daemon's HTTP surface.
//!
//! `AppState` wraps a single [`tle_runtime::Runtime`] plus the bookkeeping
//! the routes need (run lifecycle label, worker handles, SSE bus). It owns
//! no business logic itself — every field here is either a thin view onto
//! `Runtime` or pure HTTP/process plumbing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tle_runtime::Runtime;
use tle_worker::WorkerHandles;
use uuid::Uuid;

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Status(StatusSnapshot),
    LogLine { level: String, msg: String },
}

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Point-in-time snapshot of daemon state, returned by GET /v1/status and
/// carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub active_run_id: Option<Uuid>,
    /// "idle" | "running" | "halted"
    pub state: String,
    pub notes: Option<String>,
    pub kill_switch_tripped: bool,
    pub kill_switch_reason: Option<String>,
    pub config_hash: String,
    pub open_position_count: usize,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub lifecycle_state: RwLock<String>,
    pub active_run_id: RwLock<Option<Uuid>>,
    /// Handles for the four spawned §5 agents; `None` while idle/halted.
    /// Guarded by its own mutex rather than folded into `lifecycle_state`
    /// so `run/stop` can drain without blocking concurrent status reads.
    pub workers: Mutex<Option<WorkerHandles>>,
}

impl AppState {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            runtime,
            bus,
            build: BuildInfo {
                service: "tle-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            lifecycle_state: RwLock::new("idle".to_string()),
            active_run_id: RwLock::new(None),
            workers: Mutex::new(None),
        }
    }

    pub async fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            daemon_uptime_secs: uptime_secs(),
            active_run_id: *self.active_run_id.read().await,
            state: self.lifecycle_state.read().await.clone(),
            notes: None,
            kill_switch_tripped: self.runtime.kill_switch.is_tripped(),
            kill_switch_reason: self.runtime.kill_switch.reason().map(|r| r.to_string()),
            config_hash: self.runtime.config_hash.clone(),
            open_position_count: self.runtime.registry.snapshot().len(),
        }
    }

    pub async fn publish_status(&self) {
        let snap = self.status_snapshot().await;
        let _ = self.bus.send(BusMsg::Status(snap));
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
