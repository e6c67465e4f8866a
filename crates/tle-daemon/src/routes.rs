//! Axum router and all HTTP handlers for the daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{GateRefusedResponse, HealthResponse, KillSwitchResponse, MetricsResponse, PositionsResponse},
    state::{uptime_secs, AppState, BusMsg},
};

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/metrics", get(metrics_handler))
        .route("/v1/positions", get(positions_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/run/start", post(run_start))
        .route("/v1/run/stop", post(run_stop))
        .route("/v1/run/halt", post(run_halt))
        .route("/v1/killswitch/reset", post(killswitch_reset))
        .with_state(state)
}

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let snap = st.status_snapshot().await;
    let _ = st.bus.send(BusMsg::Status(snap.clone()));
    (StatusCode::OK, Json(snap))
}

/// GET /v1/metrics — periodic aggregated metrics (§4.9), read on demand
/// rather than only on the 30s cadence used for the append-only audit
/// snapshot; the audit writer still emits its own periodic
/// `MetricsSnapshotRecord` independently of this endpoint.
pub(crate) async fn metrics_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(MetricsResponse {
            metrics: st.runtime.metrics.snapshot(),
        }),
    )
}

/// GET /v1/positions — read-only mirror of the position registry (L3).
/// Never a write path; all mutation goes through the scan loop, the SL
/// worker, or reconciliation.
pub(crate) async fn positions_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(PositionsResponse {
            positions: st.runtime.registry.snapshot(),
        }),
    )
}

/// POST /v1/run/start — spawns the four §5 concurrent agents (scan loop, SL
/// worker, position monitor, lock watchdog) against the shared runtime.
///
/// Refused with 403 if the kill switch is currently tripped: a fatal
/// condition (§7) must be explicitly acknowledged via
/// `POST /v1/killswitch/reset` before a fresh run may start.
pub(crate) async fn run_start(State(st): State<Arc<AppState>>) -> Response {
    if st.runtime.kill_switch.is_tripped() {
        return (
            StatusCode::FORBIDDEN,
            Json(GateRefusedResponse {
                error: "GATE_REFUSED: kill switch is tripped; call /v1/killswitch/reset first"
                    .to_string(),
                gate: "kill_switch_tripped".to_string(),
            }),
        )
            .into_response();
    }

    let mut workers = st.workers.lock().await;
    if workers.is_none() {
        let run_id = derive_run_id(st.build.service, st.build.version);
        *st.active_run_id.write().await = Some(run_id);
        *st.lifecycle_state.write().await = "running".to_string();

        let handles = tle_worker::spawn_all(
            st.runtime.clone(),
            Arc::new(crate::wiring::NullSignalSource),
            Arc::new(crate::wiring::AlwaysOpenMarket),
            Arc::new(crate::wiring::NoNews),
            Arc::new(tle_worker::NeverCompliant),
        );
        *workers = Some(handles);
        info!(run_id = ?run_id, "run/start");
    }
    drop(workers);

    st.publish_status().await;
    let snap = st.status_snapshot().await;
    (StatusCode::OK, Json(snap)).into_response()
}

/// POST /v1/run/stop — drains the spawned agents (per §5's shutdown drain
/// period) and returns to idle. Does not touch the kill switch.
pub(crate) async fn run_stop(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    drain_workers(&st).await;
    *st.active_run_id.write().await = None;
    *st.lifecycle_state.write().await = "idle".to_string();

    info!("run/stop");
    st.publish_status().await;
    (StatusCode::OK, Json(st.status_snapshot().await))
}

/// POST /v1/run/halt — operator emergency stop: trips the kill switch
/// (`KillSwitchReason::Manual`) and drains the spawned agents, same as
/// `run/stop`, but the run is left marked `"halted"` and the kill switch
/// stays latched until an explicit `/v1/killswitch/reset`.
pub(crate) async fn run_halt(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    st.runtime.kill_switch.trip(tle_runtime::KillSwitchReason::Manual);
    drain_workers(&st).await;
    *st.lifecycle_state.write().await = "halted".to_string();

    info!("run/halt");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: "operator halt: kill switch tripped".to_string(),
    });
    st.publish_status().await;
    (StatusCode::OK, Json(st.status_snapshot().await))
}

/// POST /v1/killswitch/reset — the sole escape from a tripped kill switch
/// (§7, GLOSSARY "Circuit open" is per-ticket; this is the engine-wide
/// latch). Does not restart a run by itself.
pub(crate) async fn killswitch_reset(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    st.runtime.kill_switch.reset();

    info!("killswitch/reset");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "kill switch reset".to_string(),
    });
    st.publish_status().await;

    (
        StatusCode::OK,
        Json(KillSwitchResponse {
            tripped: false,
            reason: None,
        }),
    )
}

async fn drain_workers(st: &AppState) {
    let handles = st.workers.lock().await.take();
    if let Some(handles) = handles {
        handles
            .shutdown(Duration::from_millis(st.runtime.config.shutdown_drain_ms))
            .await;
    }
}

/// Derive a deterministic in-memory run ID from daemon build metadata. No
/// RNG: `Uuid::new_v5` over a fixed namespace, stable for a given binary
/// version.
fn derive_run_id(service: &'static str, version: &'static str) -> Uuid {
    let data = format!("tle-daemon.run.v1|{}|{}", service, version);
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Status(_) => "status",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None,
        }
    })
}
