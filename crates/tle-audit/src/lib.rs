//! Append-only, hash-chained audit log. Every decision the engine makes that
//! a human or a compliance reviewer might later need to reconstruct —
//! stop-loss attempts, position closures, periodic metrics snapshots — is
//! written here as one JSON line per event, never mutated or deleted.

mod records;
mod writer;

pub use records::{MetricsSnapshotRecord, PositionClosureRecord, SlAttemptRecord};
pub use writer::{compute_event_hash, AuditEvent, AuditWriter, VerifyResult};
pub use writer::{verify_hash_chain, verify_hash_chain_str};
