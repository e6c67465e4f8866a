use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tle_filters::{run_filters, FilterInput, NewsEvent, SignalCandidate};
use tle_runtime::Runtime;

/// Pluggable producer of `(direction, quality_score)` candidates. Strategy
/// research itself is out of scope; this is the seam where it plugs in.
pub trait SignalSource: Send + Sync {
    fn scan_candidates(&self, now: DateTime<Utc>) -> Vec<SignalCandidate>;
}

/// External market-hours and bar-feed collaborator, consumed only through
/// this narrow interface.
pub trait MarketContext: Send + Sync {
    fn minutes_to_close(&self, symbol: &str, now: DateTime<Utc>) -> i64;
    fn last_bar_volume(&self, symbol: &str) -> f64;
}

/// External high-impact news-API integration.
pub trait NewsSource: Send + Sync {
    fn active_events(&self, now: DateTime<Utc>) -> Vec<NewsEvent>;
}

/// Spawns the scan loop (§5 agent i): on each `cycle_interval_seconds` tick,
/// refreshes the symbol cache, runs every candidate through the P1 filter
/// gates, and places an entry (P2) for each that clears them. Stops placing
/// new entries once the kill switch trips, but keeps running so it can
/// resume once an operator calls `KillSwitch::reset`.
pub fn spawn_scan_loop(
    runtime: Arc<Runtime>,
    signals: Arc<dyn SignalSource>,
    market: Arc<dyn MarketContext>,
    news: Arc<dyn NewsSource>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(runtime.config.cycle_interval_seconds));
        loop {
            ticker.tick().await;
            run_scan_tick(&runtime, &*signals, &*market, &*news).await;
        }
    })
}

async fn run_scan_tick(runtime: &Runtime, signals: &dyn SignalSource, market: &dyn MarketContext, news: &dyn NewsSource) {
    if runtime.kill_switch.is_tripped() {
        tracing::warn!(reason = ?runtime.kill_switch.reason(), "scan cycle skipped: kill switch tripped");
        return;
    }

    if let Err(e) = runtime.refresh_symbols() {
        tracing::error!(error = ?e, "scan cycle: symbol refresh failed");
        return;
    }

    let now = Utc::now();
    let news_events = news.active_events(now);
    let candidates = signals.scan_candidates(now);

    for candidate in candidates {
        let symbol_info = runtime.symbols.get(&candidate.symbol);
        let minutes_to_close = market.minutes_to_close(&candidate.symbol, now);
        let bar_volume = market.last_bar_volume(&candidate.symbol);
        let open_trade_count = runtime.registry.snapshot().len() as u32;

        let input = FilterInput {
            candidate: &candidate,
            symbol_info: symbol_info.as_ref(),
            minutes_to_close,
            bar_volume,
            now,
            news_events: &news_events,
            open_trade_count,
        };

        if let Err(rejection) = run_filters(&input, &runtime.config) {
            tracing::debug!(symbol = %candidate.symbol, code = rejection.code(), "candidate rejected");
            continue;
        }

        let Some(info) = symbol_info else { continue };
        let outcome = tle_entry::place_entry(
            runtime.broker.as_ref(),
            &runtime.registry,
            &runtime.audit,
            &runtime.config,
            runtime.run_id,
            &candidate.symbol,
            &info,
            candidate.direction,
        );
        tracing::info!(symbol = %candidate.symbol, ?outcome, "P2 entry attempt");
    }
}
