//! Circuit Breaker & Metrics (C4): aggregated, atomically-updated counters
//! reported periodically (§4.9, every 30s), plus the long-horizon
//! "repeatedly failing ticket" detector that surfaces as DISABLED and
//! requires an operator reset. Per-ticket circuit-breaker *state*
//! (`consecutive_failures`, `circuit_open_until`) lives on `SlState` itself
//! (owned by the SL Application Engine); this crate owns the
//! cross-ticket aggregate view.

mod disabled;
mod snapshot;

pub use disabled::DisabledTracker;
pub use snapshot::{Metrics, MetricsSnapshot};
