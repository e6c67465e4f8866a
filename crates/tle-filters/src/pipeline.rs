use tle_config::Config;
use tle_schemas::TradeMode;

use crate::types::{FilterInput, FilterRejection};

/// Runs the six gates of §4.10 in fixed order, returning the first failure.
/// `Ok(())` means the candidate is clear to proceed to P2 entry/lot sizing.
pub fn run_filters(input: &FilterInput, config: &Config) -> Result<(), FilterRejection> {
    // 1. Symbol tradability (spread, trade mode).
    let symbol_info = input
        .symbol_info
        .ok_or(FilterRejection::SymbolNotTradable)?;
    if symbol_info.trade_mode != TradeMode::Full {
        return Err(FilterRejection::SymbolNotTradable);
    }
    if symbol_info.spread > config.max_spread {
        return Err(FilterRejection::SpreadTooWide);
    }

    // 2. Market-close proximity.
    if input.minutes_to_close <= config.market_close_buffer_minutes {
        return Err(FilterRejection::MarketCloseProximity);
    }

    // 3. Volume filter.
    if input.bar_volume < config.min_volume {
        return Err(FilterRejection::VolumeTooLow);
    }

    // 4. News filter.
    let window = chrono::Duration::minutes(config.news_block_window_minutes);
    let blocked_by_news = input.news_events.iter().any(|event| {
        event.symbol == input.candidate.symbol && (input.now - event.at).abs() <= window
    });
    if blocked_by_news {
        return Err(FilterRejection::NewsBlockWindow);
    }

    // 5. Quality score.
    if input.candidate.quality_score < config.min_quality_score {
        return Err(FilterRejection::QualityScore);
    }

    // 6. Portfolio cap. `None`/unlimited disables the check entirely (B5).
    if let Some(max_open) = config.max_open_trades {
        if input.open_trade_count >= max_open {
            return Err(FilterRejection::PortfolioCapReached);
        }
    }

    Ok(())
}
