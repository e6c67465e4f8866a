//! Request and response types for the daemon's HTTP endpoints.
//!
//! These types are `Serialize`/`Deserialize` so Axum can encode them and
//! tests can decode them. No business logic lives here.

use serde::{Deserialize, Serialize};
use tle_metrics::MetricsSnapshot;
use tle_schemas::Position;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

/// Response body when a route is refused due to a gate check failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRefusedResponse {
    pub error: String,
    /// Which gate failed, e.g. "kill_switch_tripped".
    pub gate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchResponse {
    pub tripped: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionsResponse {
    pub positions: Vec<Position>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}
