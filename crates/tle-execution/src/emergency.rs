//! Emergency Enforcement (C5): the single sanctioned lock-free path into
//! `broker.modify_order`. Invoked only by `ExecutionEngine::update_sl_atomic`
//! when ticket-lock acquisition timed out *and* the position is losing
//! beyond `max_risk_per_trade_usd` — never called directly by any other
//! component (§4.8, I3).

use tle_broker::{BrokerAdapter, ModifyResult};
use tle_clock::{Clock, RateLimiter};
use tle_config::Config;
use tle_money::Micros;
use tle_schemas::{ApplyOutcome, Position};

/// Computes the STRICT_LOSS price directly (bypassing C1, which would also
/// need the ticket lock to read `SlState`) and applies it without acquiring
/// the lock, after first taking an RPC token like every other broker call.
pub fn emergency_apply(
    broker: &dyn BrokerAdapter,
    rate_limiter: &RateLimiter,
    clock: &dyn Clock,
    config: &Config,
    position: &Position,
    contract_value: Micros,
) -> ApplyOutcome {
    if !rate_limiter.try_acquire(clock) {
        return ApplyOutcome::RateLimited;
    }

    let target_sl = position.sl_price_for_profit(-config.max_risk_per_trade_usd, contract_value);

    match broker.modify_order(position.ticket, target_sl) {
        Ok(ModifyResult::Ok) => {
            tracing::error!(
                ticket = position.ticket.raw(),
                symbol = %position.symbol,
                applied_sl = ?target_sl,
                "EMERGENCY_APPLIED"
            );
            ApplyOutcome::EmergencyApplied { applied_sl: target_sl }
        }
        Ok(ModifyResult::Rejected { reason }) => {
            tracing::warn!(ticket = position.ticket.raw(), reason, "emergency apply rejected by broker");
            ApplyOutcome::ApplyFailed {
                failure_reason: reason,
                attempts: 1,
            }
        }
        Err(e) => {
            tracing::warn!(ticket = position.ticket.raw(), error = ?e, "emergency apply transport failure");
            ApplyOutcome::ApplyFailed {
                failure_reason: format!("{e:?}"),
                attempts: 1,
            }
        }
    }
}
