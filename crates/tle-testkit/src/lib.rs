//! Scenario harness for end-to-end integration tests (§8: certified
//! scenarios S1-S6 and the cross-cutting properties I1-I5/L1-L2).
//!
//! Wraps a full [`Runtime`] around a [`SimBroker`] with a single `EURUSD`
//! fixture so a scenario test can drive a position through a profit
//! sequence and assert on the outcomes and audit trail the real agents
//! would produce, without spinning up the worker loops themselves (tests
//! call `runtime.execution.update_sl_atomic` directly, the same public
//! entry point the SL worker uses internally).

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tle_audit::AuditWriter;
use tle_broker::BrokerAdapter;
use tle_broker_sim::SimBroker;
use tle_clock::{Clock, FakeClock};
use tle_config::Config;
use tle_money::Micros;
use tle_runtime::Runtime;
use tle_schemas::{ApplyOutcome, Direction, Position, Quote, SlReason, SlState, SymbolInfo, Ticket, TradeMode};

pub const SYMBOL: &str = "EURUSD";

/// `Config::sane_defaults()` with the two knobs that exist purely to pace a
/// live deployment (verification sleep, per-ticket throttle) zeroed out.
/// Lock timeouts and the circuit breaker are left at production values so
/// contention and failure scenarios stay realistic.
pub fn fast_config() -> Config {
    let mut cfg = Config::sane_defaults();
    cfg.verification_delay_ms = 0;
    cfg.sl_update_min_interval_ms_per_ticket = 0;
    cfg
}

pub fn eurusd_symbol_info() -> SymbolInfo {
    SymbolInfo {
        symbol: SYMBOL.to_string(),
        min_lot: 0.01,
        lot_step: 0.01,
        max_lot: Some(1.0),
        contract_value: Micros::new(100_000 * tle_money::MICROS_PER_UNIT),
        spread: tle_money::price_to_micros(0.0001).unwrap(),
        trade_mode: TradeMode::Full,
        stops_level: tle_money::price_to_micros(0.0005).unwrap(),
        price_step: tle_money::price_to_micros(0.00001).unwrap(),
    }
}

fn temp_audit_path(label: &str) -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("tle-testkit-{label}-{}.jsonl", uuid::Uuid::new_v4()));
    p
}

/// A wired-up [`Runtime`] plus the [`SimBroker`] and clock used to drive it.
///
/// `Runtime::new` always constructs its own internal wall clock, so the
/// clock held here is only wired into the broker (for quote staleness) —
/// scenario determinism comes from the broker's deterministic fill/quote
/// behavior, not from a shared clock.
pub struct ScenarioHarness {
    pub runtime: Arc<Runtime>,
    pub broker: Arc<SimBroker>,
    pub clock: Arc<FakeClock>,
    pub symbol_info: SymbolInfo,
}

impl ScenarioHarness {
    pub fn new(config: Config) -> Self {
        Self::with_symbol(config, eurusd_symbol_info())
    }

    pub fn with_symbol(config: Config, symbol_info: SymbolInfo) -> Self {
        let fake = Arc::new(FakeClock::new(Utc::now().timestamp_millis()));
        let clock: Arc<dyn Clock> = fake.clone();
        let broker = Arc::new(SimBroker::new(clock));
        broker.set_symbol(symbol_info.clone());
        broker.set_quote(
            symbol_info.symbol.clone(),
            Quote {
                bid: tle_money::price_to_micros(1.10000).unwrap(),
                ask: tle_money::price_to_micros(1.10010).unwrap(),
                ts: Utc::now(),
            },
        );

        let audit = Arc::new(Mutex::new(AuditWriter::new(temp_audit_path("scenario"), true).unwrap()));
        let runtime = Runtime::new(
            config,
            "scenario-config-hash".to_string(),
            broker.clone() as Arc<dyn BrokerAdapter>,
            audit,
            uuid::Uuid::nil(),
        )
        .expect("runtime construction with sane config must succeed");

        Self {
            runtime: Arc::new(runtime),
            broker,
            clock: fake,
            symbol_info,
        }
    }

    /// Places a long entry at the configured quote and returns its ticket.
    pub fn open_long(&self) -> Ticket {
        self.open(Direction::Long)
    }

    pub fn open_short(&self) -> Ticket {
        self.open(Direction::Short)
    }

    fn open(&self, direction: Direction) -> Ticket {
        self.runtime
            .refresh_symbols()
            .expect("symbol refresh must succeed against a freshly configured SimBroker");
        let outcome = tle_entry::place_entry(
            self.runtime.broker.as_ref(),
            &self.runtime.registry,
            &self.runtime.audit,
            &self.runtime.config,
            self.runtime.run_id,
            &self.symbol_info.symbol,
            &self.symbol_info,
            direction,
        );
        match outcome {
            tle_entry::EntryOutcome::Placed { ticket, .. } => ticket,
            other => panic!("expected entry to be placed, got {other:?}"),
        }
    }

    /// Moves the quote so that `ticket`'s position shows exactly
    /// `profit_usd` at its current entry price and volume, using the same
    /// inverse-profit math the engine itself uses to size initial stops.
    pub fn set_profit_usd(&self, ticket: Ticket, profit_usd: f64) {
        let pos = self.runtime.registry.get(ticket).expect("ticket must be tracked");
        let target = pos.sl_price_for_profit(tle_money::price_to_micros(profit_usd).unwrap(), self.symbol_info.contract_value);
        let (bid, ask) = match pos.direction {
            Direction::Long => (target, target + self.symbol_info.spread),
            Direction::Short => (target - self.symbol_info.spread, target),
        };
        self.broker.set_quote(
            self.symbol_info.symbol.clone(),
            Quote { bid, ask, ts: Utc::now() },
        );
    }

    /// Calls `update_sl_atomic` once for `ticket`, the same public entry
    /// point the SL worker's tick drives.
    pub fn apply(&self, ticket: Ticket) -> ApplyOutcome {
        self.runtime.execution.update_sl_atomic(ticket)
    }

    /// Drives `ticket` through a profit sequence, applying once per value
    /// and collecting every outcome in order (§8 scenario format).
    pub fn drive_profit_sequence(&self, ticket: Ticket, profits_usd: &[f64]) -> Vec<ApplyOutcome> {
        profits_usd
            .iter()
            .map(|p| {
                self.set_profit_usd(ticket, *p);
                self.apply(ticket)
            })
            .collect()
    }

    pub fn sl_state(&self, ticket: Ticket) -> SlState {
        self.runtime.registry.sl_state(ticket).expect("sl state must be tracked")
    }

    pub fn position(&self, ticket: Ticket) -> Position {
        self.runtime.registry.get(ticket).expect("position must be tracked")
    }

    pub fn last_applied_reason(&self, ticket: Ticket) -> SlReason {
        self.sl_state(ticket).last_applied_reason
    }
}
