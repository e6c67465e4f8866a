use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tle_audit::PositionClosureRecord;
use tle_runtime::{KillSwitchReason, Runtime};

/// Spawns the position monitor (§5 agent iii): every `reconcile_interval_secs`,
/// fetches the broker's live position list and reconciles it against the
/// registry, backfilling any broker-side fill the scan loop never observed
/// and removing any ticket the broker no longer reports open. A broker call
/// that keeps failing past a few attempts trips the kill switch — a
/// reconciliation loop that cannot see the broker is a fatal condition
/// (§7: "a permanently lost broker connection").
pub fn spawn_position_monitor(runtime: Arc<Runtime>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(runtime.config.reconcile_interval_secs));
        let mut consecutive_failures = 0u32;
        loop {
            ticker.tick().await;
            let broker = runtime.broker.clone();
            let positions = tokio::task::spawn_blocking(move || broker.get_positions()).await;

            match positions {
                Ok(Ok(positions)) => {
                    consecutive_failures = 0;
                    let report = runtime.registry.reconcile_against_broker(&positions);
                    if !report.closed.is_empty() {
                        let mut writer = runtime.audit.lock().expect("audit writer mutex poisoned");
                        for ticket in &report.closed {
                            let payload = PositionClosureRecord {
                                ticket: ticket.raw(),
                                close_time: Utc::now(),
                                close_reason: "BROKER_RECONCILE_CLOSED".to_string(),
                                profit_usd: tle_money::Micros::ZERO,
                            }
                            .into_payload();
                            if let Err(e) = writer.append(runtime.run_id, "position_closure", "RECONCILE_CLOSED", payload) {
                                tracing::warn!(error = ?e, ticket = ticket.raw(), "failed to append reconcile-closure audit record");
                            }
                        }
                    }
                }
                Ok(Err(e)) => {
                    consecutive_failures += 1;
                    tracing::error!(error = ?e, consecutive_failures, "position monitor: broker unreachable");
                    if consecutive_failures >= 3 {
                        runtime.kill_switch.trip(KillSwitchReason::BrokerConnectionLost);
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "position monitor: broker task panicked");
                }
            }
        }
    })
}
