//! Explicit runtime context (Design Notes: "Replace [thread-local global
//! logger and module-level singletons] with explicit context ... threaded
//! through components"). Every concurrent agent in §5 (scan loop, SL
//! worker, position monitor, lock watchdog) is handed one `Arc<Runtime>`
//! rather than reaching for ambient globals.

use std::sync::{Arc, Mutex};

use tle_audit::AuditWriter;
use tle_broker::BrokerAdapter;
use tle_clock::{Clock, RateLimiter, Throttle, SystemClock};
use tle_config::Config;
use tle_execution::symbols::SymbolCache;
use tle_execution::{EngineDeps, ExecutionEngine};
use tle_locktable::LockTable;
use tle_metrics::{DisabledTracker, Metrics};
use tle_registry::PositionRegistry;

use crate::KillSwitch;

/// Everything the concurrent agents of §5 need, constructed once at startup.
/// Cheap to clone (every field is an `Arc`); pass `Arc<Runtime>` or clone it
/// directly into each spawned task.
#[derive(Clone)]
pub struct Runtime {
    pub config: Config,
    /// SHA-256 of the canonical JSON of `config` (see `tle-config::loader`);
    /// two runs sharing this hash are guaranteed to share identical core
    /// config, which is how the "must be equal between live and simulation
    /// modes for any certified run" lifecycle rule (§3) is mechanically
    /// checked.
    pub config_hash: String,
    pub clock: Arc<dyn Clock>,
    pub broker: Arc<dyn BrokerAdapter>,
    pub registry: Arc<PositionRegistry>,
    pub locks: Arc<LockTable>,
    pub rate_limiter: Arc<RateLimiter>,
    pub throttle: Arc<Throttle>,
    pub symbols: Arc<SymbolCache>,
    pub metrics: Arc<Metrics>,
    pub disabled: Arc<DisabledTracker>,
    pub audit: Arc<Mutex<AuditWriter>>,
    pub kill_switch: Arc<KillSwitch>,
    pub execution: ExecutionEngine,
    pub run_id: uuid::Uuid,
}

impl Runtime {
    /// Assembles the runtime from a validated config, a config provenance
    /// hash, a concrete broker adapter, and an audit writer. Every other
    /// piece of shared state (registry, lock table, rate limiter, metrics,
    /// kill switch) is constructed fresh here — this is the one place a new
    /// instance of each singleton is created.
    pub fn new(
        config: Config,
        config_hash: String,
        broker: Arc<dyn BrokerAdapter>,
        audit: Arc<Mutex<AuditWriter>>,
        run_id: uuid::Uuid,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let registry = Arc::new(PositionRegistry::new());
        let locks = Arc::new(LockTable::new());
        let rate_limiter = Arc::new(RateLimiter::new(config.global_rpc_rate_per_sec, clock.monotonic_ms()));
        let throttle = Arc::new(Throttle::new(config.sl_update_min_interval_ms_per_ticket));
        let symbols = Arc::new(SymbolCache::new());
        let metrics = Arc::new(Metrics::new());
        let disabled = Arc::new(DisabledTracker::new(config.disabled_after_minutes));
        let kill_switch = Arc::new(KillSwitch::new());

        let execution = ExecutionEngine::new(EngineDeps {
            broker: broker.clone(),
            registry: registry.clone(),
            locks: locks.clone(),
            rate_limiter: rate_limiter.clone(),
            throttle: throttle.clone(),
            clock: clock.clone(),
            metrics: metrics.clone(),
            symbols: symbols.clone(),
            audit: audit.clone(),
            config: config.clone(),
            run_id,
        });

        Ok(Self {
            config,
            config_hash,
            clock,
            broker,
            registry,
            locks,
            rate_limiter,
            throttle,
            symbols,
            metrics,
            disabled,
            audit,
            kill_switch,
            execution,
            run_id,
        })
    }

    /// Refreshes the symbol cache from the broker. Called at startup and on
    /// the scan loop's slower cadence; not itself scheduled here.
    pub fn refresh_symbols(&self) -> anyhow::Result<()> {
        let symbols = self
            .broker
            .get_symbols()
            .map_err(|e| anyhow::anyhow!("get_symbols failed: {e:?}"))?;
        self.symbols.refresh(symbols);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use tle_broker_sim::SimBroker;

    fn runtime() -> Runtime {
        let clock: Arc<dyn Clock> = Arc::new(tle_clock::FakeClock::new(Utc::now().timestamp_millis()));
        let broker: Arc<dyn BrokerAdapter> = Arc::new(SimBroker::new(clock));
        let dir = tempdir();
        let audit = Arc::new(Mutex::new(AuditWriter::new(dir.join("audit.jsonl"), true).unwrap()));
        Runtime::new(Config::sane_defaults(), "testhash".to_string(), broker, audit, uuid::Uuid::nil()).unwrap()
    }

    fn tempdir() -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("tle-runtime-test-{}", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn constructs_with_sane_defaults() {
        let rt = runtime();
        assert_eq!(rt.registry.snapshot().len(), 0);
        assert!(!rt.kill_switch.is_tripped());
    }

    #[test]
    fn rejects_invalid_config() {
        let clock: Arc<dyn Clock> = Arc::new(tle_clock::FakeClock::new(0));
        let broker: Arc<dyn BrokerAdapter> = Arc::new(SimBroker::new(clock));
        let dir = tempdir();
        let audit = Arc::new(Mutex::new(AuditWriter::new(dir.join("audit.jsonl"), false).unwrap()));
        let mut bad = Config::sane_defaults();
        bad.max_risk_per_trade_usd = tle_money::Micros::ZERO;
        assert!(Runtime::new(bad, "h".to_string(), broker, audit, uuid::Uuid::nil()).is_err());
    }
}
