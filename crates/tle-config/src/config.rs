use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tle_money::Micros;

mod dollars {
    use serde::{Deserialize, Deserializer, Serializer};
    use tle_money::Micros;

    pub fn serialize<S: Serializer>(v: &Micros, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(tle_money::micros_to_price(*v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Micros, D::Error> {
        let raw = f64::deserialize(d)?;
        tle_money::price_to_micros(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Live,
    Simulation,
}

/// Immutable configuration, loaded and validated once at startup. Identical
/// logic runs for `Mode::Live` and `Mode::Simulation`; only the broker
/// adapter implementation differs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,

    #[serde(with = "dollars")]
    pub max_risk_per_trade_usd: Micros,
    pub default_lot: f64,
    pub max_lot_cap: f64,
    pub max_open_trades: Option<u32>,

    #[serde(with = "dollars")]
    pub sweet_spot_min_usd: Micros,
    #[serde(with = "dollars")]
    pub sweet_spot_max_usd: Micros,
    #[serde(with = "dollars")]
    pub trailing_increment_usd: Micros,
    pub pullback_tolerance_pct: f64,
    #[serde(with = "dollars")]
    pub big_jump_threshold_usd: Micros,
    #[serde(with = "dollars")]
    pub big_jump_lock_margin_usd: Micros,
    #[serde(with = "dollars")]
    pub max_peak_lock_usd: Micros,

    /// Buffer added to `sweet_spot_min_usd` before the micro-profit bypass
    /// may close a position (spread/slippage margin).
    #[serde(with = "dollars")]
    pub micro_profit_close_buffer_usd: Micros,
    /// Extended-multiples band for the micro-profit bypass above
    /// `sweet_spot_max_usd`. Disabled by default per the design notes' Open
    /// Question — the source material left this ambiguous.
    pub micro_profit_extended_band_enabled: bool,
    #[serde(with = "dollars")]
    pub micro_profit_extended_band_margin_usd: Micros,

    pub worker_interval_ms: u64,
    pub lock_timeout_ms_normal: u64,
    pub lock_timeout_ms_profit_locking: u64,
    pub max_hold_time_ms: u64,
    pub lock_watchdog_interval_ms: u64,

    pub sl_update_min_interval_ms_per_ticket: u64,
    pub global_rpc_rate_per_sec: u32,

    pub max_retries: u32,
    pub verification_delay_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_cooloff_ms: u64,
    /// A ticket with repeated verification failures past this horizon is
    /// reported DISABLED and requires an operator reset.
    pub disabled_after_minutes: i64,

    pub min_quality_score: f64,
    pub news_block_window_minutes: i64,
    pub market_close_buffer_minutes: i64,
    pub min_volume: f64,
    /// Entry gate (§4.10 step 1): reject a signal whose symbol currently
    /// quotes a spread above this, in price units (same scale as a price,
    /// not a USD amount).
    #[serde(with = "dollars")]
    pub max_spread: Micros,

    pub reconcile_interval_secs: u64,
    pub cycle_interval_seconds: u64,
    pub slow_iteration_budget_ms: u64,
    pub shutdown_drain_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::sane_defaults()
    }
}

impl Config {
    pub fn sane_defaults() -> Self {
        let usd = |d: f64| tle_money::price_to_micros(d).expect("finite default");
        Self {
            mode: Mode::Simulation,

            max_risk_per_trade_usd: usd(2.0),
            default_lot: 0.01,
            max_lot_cap: 0.05,
            max_open_trades: None,

            sweet_spot_min_usd: usd(0.03),
            sweet_spot_max_usd: usd(0.10),
            trailing_increment_usd: usd(0.10),
            pullback_tolerance_pct: 0.30,
            big_jump_threshold_usd: usd(0.40),
            big_jump_lock_margin_usd: usd(0.10),
            max_peak_lock_usd: usd(0.80),

            micro_profit_close_buffer_usd: usd(0.02),
            micro_profit_extended_band_enabled: false,
            micro_profit_extended_band_margin_usd: usd(0.02),

            worker_interval_ms: 50,
            lock_timeout_ms_normal: 1_000,
            lock_timeout_ms_profit_locking: 2_000,
            max_hold_time_ms: 500,
            lock_watchdog_interval_ms: 100,

            sl_update_min_interval_ms_per_ticket: 100,
            global_rpc_rate_per_sec: 50,

            max_retries: 3,
            verification_delay_ms: 500,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooloff_ms: 30_000,
            disabled_after_minutes: 10,

            min_quality_score: 60.0,
            news_block_window_minutes: 10,
            market_close_buffer_minutes: 30,
            min_volume: 0.0,
            max_spread: usd(0.0003),

            reconcile_interval_secs: 5,
            cycle_interval_seconds: 45,
            slow_iteration_budget_ms: 1_000,
            shutdown_drain_ms: 2_000,
        }
    }

    /// Validates the configuration invariants this engine depends on.
    /// Called once at startup; an invalid config is a fatal condition.
    pub fn validate(&self) -> Result<()> {
        if self.max_risk_per_trade_usd.raw() <= 0 {
            return Err(anyhow!("max_risk_per_trade_usd must be positive"));
        }
        if self.default_lot <= 0.0 {
            return Err(anyhow!("default_lot must be positive"));
        }
        if self.max_lot_cap < self.default_lot {
            return Err(anyhow!("max_lot_cap must be >= default_lot"));
        }
        if self.sweet_spot_min_usd > self.sweet_spot_max_usd {
            return Err(anyhow!("sweet_spot_min_usd must be <= sweet_spot_max_usd"));
        }
        if self.trailing_increment_usd.raw() <= 0 {
            return Err(anyhow!("trailing_increment_usd must be positive"));
        }
        if !(0.0..=1.0).contains(&self.pullback_tolerance_pct) {
            return Err(anyhow!("pullback_tolerance_pct must be in [0, 1]"));
        }
        if self.worker_interval_ms < 50 {
            return Err(anyhow!("worker_interval_ms floor is 50ms"));
        }
        if self.global_rpc_rate_per_sec == 0 {
            return Err(anyhow!("global_rpc_rate_per_sec must be > 0"));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(anyhow!("circuit_breaker_threshold must be > 0"));
        }
        if self.max_spread.raw() <= 0 {
            return Err(anyhow!("max_spread must be positive"));
        }
        if self.verification_delay_ms >= self.max_hold_time_ms {
            return Err(anyhow!(
                "verification_delay_ms must be less than max_hold_time_ms (the lock watchdog would force-release a lock held for an ordinary verification wait)"
            ));
        }
        Ok(())
    }

    /// Effective worker cadence: the configured interval, floored at 50ms.
    pub fn effective_worker_interval_ms(&self) -> u64 {
        self.worker_interval_ms.max(50)
    }
}
