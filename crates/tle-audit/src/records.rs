//! Typed payload builders for the three persistent-output record shapes.
//! These are thin `serde_json::Value` builders, not separate storage: every
//! record still flows through [`crate::AuditWriter::append`] so it picks up
//! `event_id`/hash-chain treatment uniformly.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tle_money::Micros;

/// One attempt to update a ticket's stop-loss, successful or not.
pub struct SlAttemptRecord {
    pub timestamp: DateTime<Utc>,
    pub ticket: u64,
    pub symbol: String,
    pub direction: String,
    pub entry: Micros,
    pub current_price: Micros,
    pub profit_usd: Micros,
    pub target_sl: Option<Micros>,
    pub applied_sl: Option<Micros>,
    pub reason: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl SlAttemptRecord {
    pub fn into_payload(self) -> Value {
        json!({
            "timestamp": self.timestamp,
            "ticket": self.ticket,
            "symbol": self.symbol,
            "direction": self.direction,
            "entry": tle_money::micros_to_price(self.entry),
            "current_price": tle_money::micros_to_price(self.current_price),
            "profit_usd": tle_money::micros_to_price(self.profit_usd),
            "target_sl": self.target_sl.map(tle_money::micros_to_price),
            "applied_sl": self.applied_sl.map(tle_money::micros_to_price),
            "reason": self.reason,
            "success": self.success,
            "failure_reason": self.failure_reason,
            "attempts": self.attempts,
            "duration_ms": self.duration_ms,
        })
    }
}

/// Emitted when a position closes, for win-rate / outcome reporting.
pub struct PositionClosureRecord {
    pub ticket: u64,
    pub close_time: DateTime<Utc>,
    pub close_reason: String,
    pub profit_usd: Micros,
}

impl PositionClosureRecord {
    pub fn into_payload(self) -> Value {
        json!({
            "ticket": self.ticket,
            "close_time": self.close_time,
            "close_reason": self.close_reason,
            "profit_usd": tle_money::micros_to_price(self.profit_usd),
        })
    }
}

/// Periodic snapshot of aggregate engine metrics.
pub struct MetricsSnapshotRecord {
    pub timestamp: DateTime<Utc>,
    pub open_positions: u32,
    pub sl_updates_applied: u64,
    pub sl_updates_failed: u64,
    pub circuit_breaker_trips: u64,
    pub avg_cycle_ms: f64,
    pub worst_cycle_ms: u64,
}

impl MetricsSnapshotRecord {
    pub fn into_payload(self) -> Value {
        json!({
            "timestamp": self.timestamp,
            "open_positions": self.open_positions,
            "sl_updates_applied": self.sl_updates_applied,
            "sl_updates_failed": self.sl_updates_failed,
            "circuit_breaker_trips": self.circuit_breaker_trips,
            "avg_cycle_ms": self.avg_cycle_ms,
            "worst_cycle_ms": self.worst_cycle_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sl_attempt_payload_round_trips_dollars() {
        let rec = SlAttemptRecord {
            timestamp: Utc::now(),
            ticket: 42,
            symbol: "EURUSD".to_string(),
            direction: "LONG".to_string(),
            entry: tle_money::price_to_micros(1.10000).unwrap(),
            current_price: tle_money::price_to_micros(1.10500).unwrap(),
            profit_usd: tle_money::price_to_micros(0.05).unwrap(),
            target_sl: Some(tle_money::price_to_micros(1.10050).unwrap()),
            applied_sl: Some(tle_money::price_to_micros(1.10050).unwrap()),
            reason: "SWEET_SPOT".to_string(),
            success: true,
            failure_reason: None,
            attempts: 1,
            duration_ms: 12,
        };
        let payload = rec.into_payload();
        assert_eq!(payload["ticket"], 42);
        assert_eq!(payload["reason"], "SWEET_SPOT");
        assert!(payload["success"].as_bool().unwrap());
    }
}
