use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tle_entry::CompliancePredicate;
use tle_runtime::Runtime;
use tle_schemas::ApplyOutcome;

/// Spawns the SL worker (§5 agent ii): on each `worker_interval_ms` tick,
/// calls `ExecutionEngine::update_sl_atomic` for every tracked ticket not
/// currently reported DISABLED, then runs the P3 early-exit bypasses ("each
/// worker tick", §4.12). Runs regardless of kill-switch state — §7 requires
/// the SL worker to keep draining existing positions even after a trip.
pub fn spawn_sl_worker(runtime: Arc<Runtime>, compliance: Arc<dyn CompliancePredicate>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(runtime.config.effective_worker_interval_ms()));
        loop {
            ticker.tick().await;
            run_worker_tick(&runtime, &*compliance).await;
        }
    })
}

async fn run_worker_tick(runtime: &Runtime, compliance: &dyn CompliancePredicate) {
    let started_ms = runtime.clock.monotonic_ms();
    let tickets: Vec<_> = runtime.registry.snapshot().into_iter().map(|p| p.ticket).collect();

    for ticket in tickets {
        if runtime.disabled.is_disabled(ticket, runtime.clock.monotonic_ms()) {
            continue;
        }
        let engine = runtime.execution.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.update_sl_atomic(ticket))
            .await
            .unwrap_or(ApplyOutcome::NoPosition);

        match &outcome {
            ApplyOutcome::Ok { .. } | ApplyOutcome::EmergencyApplied { .. } => {
                runtime.metrics.record_success();
                runtime.disabled.record_success(ticket);
            }
            ApplyOutcome::NoPosition | ApplyOutcome::NoUpdate | ApplyOutcome::CircuitOpen | ApplyOutcome::Throttled | ApplyOutcome::LockTimeout | ApplyOutcome::RateLimited => {}
            ApplyOutcome::NonMonotonic | ApplyOutcome::BrokerConstraint | ApplyOutcome::VerificationFailed | ApplyOutcome::ApplyFailed { .. } => {
                runtime.metrics.record_failure();
                runtime.disabled.record_failure(ticket, runtime.clock.monotonic_ms());
            }
        }
    }

    let elapsed_ms = (runtime.clock.monotonic_ms() - started_ms).max(0) as u64;
    if elapsed_ms > runtime.config.slow_iteration_budget_ms {
        runtime.metrics.record_slow_iteration();
        tracing::warn!(elapsed_ms, budget_ms = runtime.config.slow_iteration_budget_ms, "SLOW_ITERATION");
    }

    run_bypasses(runtime, compliance).await;
}

async fn run_bypasses(runtime: &Runtime, compliance: &dyn CompliancePredicate) {
    let micro_results = tle_entry::scan_micro_profit_closures(
        &runtime.registry,
        runtime.broker.as_ref(),
        &runtime.symbols,
        &runtime.audit,
        &runtime.config,
        runtime.run_id,
    );
    for (ticket, outcome) in micro_results {
        if let tle_entry::ClosureOutcome::Closed { profit_usd, .. } = outcome {
            tracing::info!(ticket = ticket.raw(), profit_usd = %profit_usd, "MICRO_PROFIT_CLOSURE");
        }
    }

    let compliance_results = tle_entry::scan_compliance_closures(
        &runtime.registry,
        runtime.broker.as_ref(),
        &runtime.symbols,
        &runtime.audit,
        compliance,
        Utc::now(),
        runtime.run_id,
    );
    for (ticket, outcome) in compliance_results {
        if let tle_entry::ClosureOutcome::Closed { reason, .. } = outcome {
            tracing::info!(ticket = ticket.raw(), reason, "COMPLIANCE_CLOSURE");
        }
    }
}
