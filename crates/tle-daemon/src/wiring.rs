//! Default (inert) implementations of the four pluggable external
//! collaborators §1 names as out of scope: the signal generator, the
//! market-hours/bar-feed context, and the news-API integration. A real
//! deployment supplies its own via [`tle_worker::spawn_all`]; the daemon
//! binary ships these safe no-op defaults so it boots and serves its status
//! surface without placing a single order on its own initiative.

use chrono::{DateTime, Utc};
use tle_filters::{NewsEvent, SignalCandidate};
use tle_worker::{MarketContext, NewsSource, SignalSource};

/// Never produces a candidate. No trading strategy research happens here
/// (§1 Non-goals); a real deployment links in its own `SignalSource`.
pub struct NullSignalSource;
impl SignalSource for NullSignalSource {
    fn scan_candidates(&self, _now: DateTime<Utc>) -> Vec<SignalCandidate> {
        Vec::new()
    }
}

/// Reports every symbol as always open with ample volume. Safe only because
/// paired with [`NullSignalSource`], which never proposes anything for this
/// context to gate.
pub struct AlwaysOpenMarket;
impl MarketContext for AlwaysOpenMarket {
    fn minutes_to_close(&self, _symbol: &str, _now: DateTime<Utc>) -> i64 {
        24 * 60
    }

    fn last_bar_volume(&self, _symbol: &str) -> f64 {
        f64::MAX
    }
}

/// Never reports an active high-impact news event.
pub struct NoNews;
impl NewsSource for NoNews {
    fn active_events(&self, _now: DateTime<Utc>) -> Vec<NewsEvent> {
        Vec::new()
    }
}
