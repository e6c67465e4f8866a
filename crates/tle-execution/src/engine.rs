use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tle_audit::{AuditWriter, SlAttemptRecord};
use tle_broker::{BrokerAdapter, ModifyResult};
use tle_clock::{Clock, RateLimiter, Throttle};
use tle_config::Config;
use tle_locktable::{LockTable, TicketGuard};
use tle_metrics::Metrics;
use tle_money::Micros;
use tle_registry::PositionRegistry;
use tle_schemas::{ApplyOutcome, LockKind, SlState, Ticket};

use crate::stops::enforce_stops_level;
use crate::symbols::SymbolCache;
use crate::EngineDeps;

/// What an attempt made while holding the ticket lock decided to do next,
/// once the lock has been released.
enum AttemptOutcome {
    Done(ApplyOutcome),
    Retry,
}

/// `update_sl_atomic` is the single source of truth for stop-loss
/// modifications (§4.6). Every field is already behind an `Arc` so cloning
/// `ExecutionEngine` is cheap — callers (the worker, the daemon's
/// manual-override handler) hold one shared instance.
#[derive(Clone)]
pub struct ExecutionEngine {
    broker: Arc<dyn BrokerAdapter>,
    registry: Arc<PositionRegistry>,
    locks: Arc<LockTable>,
    rate_limiter: Arc<RateLimiter>,
    throttle: Arc<Throttle>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    symbols: Arc<SymbolCache>,
    audit: Arc<Mutex<AuditWriter>>,
    config: Config,
    run_id: uuid::Uuid,
}

impl ExecutionEngine {
    pub fn new(deps: EngineDeps) -> Self {
        Self {
            broker: deps.broker,
            registry: deps.registry,
            locks: deps.locks,
            rate_limiter: deps.rate_limiter,
            throttle: deps.throttle,
            clock: deps.clock,
            metrics: deps.metrics,
            symbols: deps.symbols,
            audit: deps.audit,
            config: deps.config,
            run_id: deps.run_id,
        }
    }

    fn now_dt(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.clock.now_ms()).unwrap_or_else(Utc::now)
    }

    /// §4.6, steps 1-12. Blocking: the broker adapter contract (§4.1) is
    /// itself blocking. The ticket lock is only held for the steps that
    /// must be serialized against other appliers of this ticket (recompute,
    /// monotonicity check, stops-level adjustment, the `modify_order` call
    /// itself); the verification delay and its re-check run with the lock
    /// released, so a successful apply awaiting broker confirmation does
    /// not look like a stuck lock to the watchdog (`max_hold_time_ms`
    /// defaults to the same 500ms as `verification_delay_ms`). Callers on
    /// an async runtime should invoke this from `spawn_blocking`.
    pub fn update_sl_atomic(&self, ticket: Ticket) -> ApplyOutcome {
        self.metrics.record_update_attempt();

        let Some(position) = self.registry.get(ticket) else {
            return ApplyOutcome::NoPosition;
        };
        let Some(sl_state) = self.registry.sl_state(ticket) else {
            return ApplyOutcome::NoPosition;
        };
        let Some(symbol_info) = self.symbols.get(&position.symbol) else {
            tracing::warn!(ticket = ticket.raw(), symbol = %position.symbol, "no symbol metadata cached, skipping");
            return ApplyOutcome::NoPosition;
        };

        let now = self.now_dt();
        if sl_state.is_circuit_open(now) {
            return ApplyOutcome::CircuitOpen;
        }
        if sl_state.verification_pending {
            // A previous apply's broker confirmation hasn't landed yet;
            // skip rather than submit a second modify_order into the same
            // confirmation window (this is what stands in for the ticket
            // lock while it's deliberately released, see above). A flag
            // still set long past its own confirmation window is treated
            // as abandoned — e.g. the attempt that set it never got to
            // finalize — rather than wedging the ticket forever.
            let grace_ms = self.config.verification_delay_ms as i64 + self.config.lock_timeout_ms_profit_locking as i64;
            let elapsed_ms = (now - sl_state.last_attempt_at).num_milliseconds();
            if elapsed_ms < grace_ms {
                return ApplyOutcome::Throttled;
            }
            tracing::warn!(ticket = ticket.raw(), elapsed_ms, "verification_pending stale past grace window, proceeding");
        }
        if !self
            .throttle
            .check_and_record(ticket.raw(), self.clock.monotonic_ms())
        {
            return ApplyOutcome::Throttled;
        }

        let rough_profit = position.profit_usd(symbol_info.contract_value);
        let (kind, timeout_ms) = if rough_profit >= self.config.sweet_spot_min_usd {
            (LockKind::ProfitLocking, self.config.lock_timeout_ms_profit_locking)
        } else {
            (LockKind::Normal, self.config.lock_timeout_ms_normal)
        };

        for attempt in 1..=self.config.max_retries {
            let guard = match self
                .locks
                .try_acquire(ticket, kind, timeout_ms, &*self.clock, "sl_worker")
            {
                Some(g) => {
                    self.metrics.record_lock_attempt(false);
                    g
                }
                None => {
                    self.metrics.record_lock_attempt(true);
                    let losing_beyond_cap = rough_profit < -self.config.max_risk_per_trade_usd;
                    if losing_beyond_cap {
                        tracing::warn!(ticket = ticket.raw(), "lock timeout on losing position, invoking emergency path");
                        self.metrics.record_emergency_invocation();
                        return crate::emergency_apply(
                            self.broker.as_ref(),
                            &self.rate_limiter,
                            &*self.clock,
                            &self.config,
                            &position,
                            symbol_info.contract_value,
                        );
                    }
                    tracing::debug!(ticket = ticket.raw(), "lock timeout, skipping tick");
                    return ApplyOutcome::LockTimeout;
                }
            };

            match self.attempt_under_lock(ticket, &position, &symbol_info, kind, timeout_ms, attempt, guard) {
                AttemptOutcome::Done(outcome) => return outcome,
                AttemptOutcome::Retry => {}
            }

            sleep(Duration::from_millis(10u64 * (1u64 << (attempt - 1).min(4))));
        }

        // max_retries == 0 is rejected by Config::validate, so this is
        // unreachable in a validated configuration; kept as a defensive
        // fallback rather than a panic.
        ApplyOutcome::ApplyFailed {
            failure_reason: "max_retries exhausted".to_string(),
            attempts: self.config.max_retries,
        }
    }

    /// Steps 5-11, a single attempt. Consumes `guard`: the lock is held for
    /// recompute/monotonicity/stops-level/`modify_order` and then either
    /// dropped immediately (every terminal disposition that isn't a
    /// successful submission) or dropped explicitly before the
    /// verification delay and briefly reacquired afterward just to record
    /// the outcome, so the sleep itself never runs with the ticket lock
    /// held.
    fn attempt_under_lock(
        &self,
        ticket: Ticket,
        position: &tle_schemas::Position,
        symbol_info: &tle_schemas::SymbolInfo,
        kind: LockKind,
        timeout_ms: u64,
        attempt: u32,
        guard: TicketGuard,
    ) -> AttemptOutcome {
        let Some(mut sl_state) = self.registry.sl_state(ticket) else {
            return AttemptOutcome::Done(ApplyOutcome::NoPosition);
        };
        let min_distance = symbol_info.stops_level + symbol_info.spread;

        let quote = match self.broker.get_quote(&position.symbol) {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(ticket = ticket.raw(), error = ?e, "quote unavailable, skipping tick");
                return AttemptOutcome::Done(ApplyOutcome::NoUpdate);
            }
        };

        let mut pos = position.clone();
        pos.current_price = quote.close_price(pos.direction);
        let profit = pos.profit_usd(symbol_info.contract_value);

        let proposal = tle_slcore::compute_target_sl(&pos, profit, &sl_state, &self.config, symbol_info.contract_value);
        let (target_sl, reason, peak_profit_usd) = match proposal {
            tle_slcore::SlProposal::NoUpdate => return AttemptOutcome::Done(ApplyOutcome::NoUpdate),
            tle_slcore::SlProposal::Apply {
                target_sl,
                reason,
                peak_profit_usd,
            } => (target_sl, reason, peak_profit_usd),
        };

        if !pos.is_protective_or_equal(target_sl, sl_state.last_applied_sl) {
            tracing::warn!(ticket = ticket.raw(), ?target_sl, last_applied = ?sl_state.last_applied_sl, "NON_MONOTONIC proposal dropped");
            return AttemptOutcome::Done(ApplyOutcome::NonMonotonic);
        }
        // Proposal matches what's already applied (L1: idempotence) —
        // nothing protective changes, so skip the RPC entirely rather
        // than re-issuing an identical modify_order every tick.
        if target_sl == sl_state.last_applied_sl {
            return AttemptOutcome::Done(ApplyOutcome::NoUpdate);
        }
        if let Some(current_sl) = pos.current_sl {
            if !pos.is_protective_or_equal(target_sl, current_sl) {
                return AttemptOutcome::Done(ApplyOutcome::NonMonotonic);
            }
        }

        let final_sl = match enforce_stops_level(pos.direction, pos.current_price, target_sl, min_distance, sl_state.last_applied_sl) {
            Some(v) => v,
            None => {
                tracing::warn!(ticket = ticket.raw(), "BROKER_CONSTRAINT: no valid protective price satisfies stops-level");
                return AttemptOutcome::Done(ApplyOutcome::BrokerConstraint);
            }
        };
        if final_sl != target_sl {
            tracing::warn!(
                ticket = ticket.raw(),
                requested = ?target_sl,
                widened_to = ?final_sl,
                "stops-level widening applied; loss cap may be exceeded"
            );
        }

        if !self.rate_limiter.try_acquire(&*self.clock) {
            self.metrics.record_rate_limited();
            return AttemptOutcome::Done(ApplyOutcome::RateLimited);
        }

        let start_ms = self.clock.monotonic_ms();
        match self.broker.modify_order(ticket, final_sl) {
            Ok(ModifyResult::Ok) => {
                sl_state.verification_pending = true;
                sl_state.last_attempt_at = self.now_dt();
                self.registry.replace_sl_state(ticket, sl_state.clone());
                drop(guard);

                if self.config.verification_delay_ms > 0 {
                    sleep(Duration::from_millis(self.config.verification_delay_ms));
                }
                let verified = self.verify_applied(ticket, final_sl, symbol_info.price_step);

                // Reacquire only to record the result: SL state is mutated
                // only while holding the ticket lock (§5).
                let Some(_finalize_guard) = self.locks.try_acquire(ticket, kind, timeout_ms, &*self.clock, "sl_worker_verify") else {
                    tracing::warn!(ticket = ticket.raw(), "could not reacquire lock to record verification result");
                    return AttemptOutcome::Done(if verified {
                        ApplyOutcome::Ok { applied_sl: final_sl, reason }
                    } else {
                        ApplyOutcome::VerificationFailed
                    });
                };

                if verified {
                    let duration_ms = (self.clock.monotonic_ms() - start_ms).max(0) as u64;
                    self.finalize_success(ticket, position, &mut sl_state, final_sl, reason, peak_profit_usd, profit, duration_ms, attempt);
                    return AttemptOutcome::Done(ApplyOutcome::Ok { applied_sl: final_sl, reason });
                }

                self.metrics.record_verification_failure();
                sl_state.verification_pending = false;
                if attempt >= self.config.max_retries {
                    self.open_circuit(ticket, &mut sl_state);
                    return AttemptOutcome::Done(ApplyOutcome::VerificationFailed);
                }
                self.registry.replace_sl_state(ticket, sl_state.clone());
                AttemptOutcome::Retry
            }
            Ok(ModifyResult::Rejected { reason: rej }) => {
                self.metrics.record_failure();
                if attempt >= self.config.max_retries {
                    self.open_circuit(ticket, &mut sl_state);
                    return AttemptOutcome::Done(ApplyOutcome::ApplyFailed {
                        failure_reason: rej,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Retry
            }
            Err(e) => {
                self.metrics.record_failure();
                if attempt >= self.config.max_retries {
                    self.open_circuit(ticket, &mut sl_state);
                    return AttemptOutcome::Done(ApplyOutcome::ApplyFailed {
                        failure_reason: format!("{e:?}"),
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Retry
            }
        }
    }

    fn verify_applied(&self, ticket: Ticket, expected: Micros, price_step: Micros) -> bool {
        let positions = match self.broker.get_positions() {
            Ok(p) => p,
            Err(_) => return false,
        };
        let Some(p) = positions.into_iter().find(|p| p.ticket == ticket) else {
            return false;
        };
        let Some(observed) = p.current_sl else { return false };
        let tolerance = price_step.saturating_add(price_step);
        (observed.saturating_sub(expected)).abs() <= tolerance
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize_success(
        &self,
        ticket: Ticket,
        position: &tle_schemas::Position,
        sl_state: &mut SlState,
        applied_sl: Micros,
        reason: tle_schemas::SlReason,
        peak_profit_usd: Micros,
        profit_usd: Micros,
        duration_ms: u64,
        attempts: u32,
    ) {
        let now = self.now_dt();
        let first_protection_entry = !sl_state.has_entered_protection()
            && matches!(reason, tle_schemas::SlReason::SweetSpot | tle_schemas::SlReason::Trailing)
            && sl_state.sweet_spot_entered_at.is_none();

        sl_state.last_applied_sl = applied_sl;
        sl_state.last_applied_reason = reason;
        sl_state.last_applied_profit_usd = profit_usd;
        sl_state.last_attempt_at = now;
        sl_state.consecutive_failures = 0;
        sl_state.circuit_open_until = None;
        sl_state.peak_profit_usd = peak_profit_usd;
        sl_state.verification_pending = false;
        if first_protection_entry {
            sl_state.sweet_spot_entered_at = Some(now);
            let activation_ms = (now - position.opened_at).num_milliseconds().max(0) as u64;
            self.metrics.record_activation_time_ms(activation_ms);
        }

        self.registry.replace_sl_state(ticket, sl_state.clone());
        self.registry.update_price_and_sl(ticket, position.current_price, Some(applied_sl));
        self.metrics.record_success();

        let mut audit = self.audit.lock().expect("audit writer mutex poisoned");
        let payload = SlAttemptRecord {
            timestamp: now,
            ticket: ticket.raw(),
            symbol: position.symbol.clone(),
            direction: position.direction.to_string(),
            entry: position.entry_price,
            current_price: position.current_price,
            profit_usd,
            target_sl: Some(applied_sl),
            applied_sl: Some(applied_sl),
            reason: reason.to_string(),
            success: true,
            failure_reason: None,
            attempts,
            duration_ms,
        }
        .into_payload();
        if let Err(e) = audit.append(self.run_id, "sl_attempt", "SL_ATTEMPT", payload) {
            tracing::warn!(error = ?e, "failed to append sl attempt audit record");
        }
    }

    fn open_circuit(&self, ticket: Ticket, sl_state: &mut SlState) {
        sl_state.consecutive_failures += 1;
        if sl_state.consecutive_failures >= self.config.circuit_breaker_threshold {
            let until = self.now_dt() + chrono::Duration::milliseconds(self.config.circuit_breaker_cooloff_ms as i64);
            sl_state.circuit_open_until = Some(until);
            self.metrics.record_circuit_breaker_trip();
            tracing::warn!(ticket = ticket.raw(), until = %until, "CIRCUIT_OPEN");
        }
        self.registry.replace_sl_state(ticket, sl_state.clone());
    }
}
