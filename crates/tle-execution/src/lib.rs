//! SL Application Engine (C2): the single source of truth for stop-loss
//! modifications. `ExecutionEngine::update_sl_atomic` is the only sanctioned
//! entry point into `BrokerAdapter::modify_order`, with one exception — the
//! lock-free emergency path (C5), reserved for a losing position whose
//! ticket lock could not be acquired in time.
//!
//! No other component may call `modify_order` directly; the worker (C3),
//! the early-exit bypasses (P3), and the daemon's manual-override surface
//! all route through this engine.

mod emergency;
mod engine;
mod stops;
pub mod symbols;

pub use emergency::emergency_apply;
pub use engine::ExecutionEngine;

use std::sync::{Arc, Mutex};

use tle_audit::AuditWriter;
use tle_broker::BrokerAdapter;
use tle_clock::{Clock, RateLimiter, Throttle};
use tle_config::Config;
use tle_locktable::LockTable;
use tle_metrics::Metrics;
use tle_registry::PositionRegistry;

use crate::symbols::SymbolCache;

/// Everything `ExecutionEngine` needs, grouped so callers (the worker, the
/// entry pipeline, the daemon's manual-override handler) construct it once
/// at startup and share the `Arc` around rather than threading each field
/// through individually.
pub struct EngineDeps {
    pub broker: Arc<dyn BrokerAdapter>,
    pub registry: Arc<PositionRegistry>,
    pub locks: Arc<LockTable>,
    pub rate_limiter: Arc<RateLimiter>,
    pub throttle: Arc<Throttle>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<Metrics>,
    pub symbols: Arc<SymbolCache>,
    pub audit: Arc<Mutex<AuditWriter>>,
    pub config: Config,
    pub run_id: uuid::Uuid,
}
