use chrono::{DateTime, Utc};
use tle_schemas::{Direction, SymbolInfo};

/// `(direction, quality_score)` from the pluggable signal generator (§1: "the
/// signal generator is treated as a pluggable producer of
/// `(direction, quality_score)`" — strategy research itself is out of scope).
#[derive(Clone, Debug, PartialEq)]
pub struct SignalCandidate {
    pub symbol: String,
    pub direction: Direction,
    pub quality_score: f64,
}

/// A high-impact news event with a wall-clock timestamp, supplied by the
/// external news-API integration (out of scope per §1; consumed here only
/// through this small struct).
#[derive(Clone, Debug, PartialEq)]
pub struct NewsEvent {
    pub symbol: String,
    pub at: DateTime<Utc>,
}

/// Everything the P1 gate sequence needs for one candidate, gathered by the
/// scan loop before calling [`crate::run_filters`].
pub struct FilterInput<'a> {
    pub candidate: &'a SignalCandidate,
    pub symbol_info: Option<&'a SymbolInfo>,
    /// Minutes until this symbol's market session closes, from the broker's
    /// per-symbol market hours (external collaborator per §1).
    pub minutes_to_close: i64,
    /// Most recent completed bar's volume for this symbol.
    pub bar_volume: f64,
    pub now: DateTime<Utc>,
    pub news_events: &'a [NewsEvent],
    pub open_trade_count: u32,
}

/// Structured rejection with a stable code (§4.10, §8 S5/S6: scenario tests
/// assert on these codes directly).
#[derive(Clone, Debug, PartialEq)]
pub enum FilterRejection {
    SymbolNotTradable,
    SpreadTooWide,
    MarketCloseProximity,
    VolumeTooLow,
    NewsBlockWindow,
    QualityScore,
    PortfolioCapReached,
}

impl FilterRejection {
    pub fn code(&self) -> &'static str {
        match self {
            FilterRejection::SymbolNotTradable => "SYMBOL_NOT_TRADABLE",
            FilterRejection::SpreadTooWide => "RISK_CHECK_SPREAD",
            FilterRejection::MarketCloseProximity => "MARKET_CLOSE_PROXIMITY",
            FilterRejection::VolumeTooLow => "VOLUME_TOO_LOW",
            FilterRejection::NewsBlockWindow => "NEWS_BLOCK_WINDOW",
            FilterRejection::QualityScore => "QUALITY_SCORE",
            FilterRejection::PortfolioCapReached => "PORTFOLIO_CAP_REACHED",
        }
    }
}

impl std::fmt::Display for FilterRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}
