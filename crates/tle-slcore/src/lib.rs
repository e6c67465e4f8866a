//! SL Computation Engine (C1): a pure, deterministic function of
//! `(Position, current_profit_usd, SlState, Config)` producing a proposed
//! stop-loss price and reason, per the priority order STRICT_LOSS >
//! SWEET_SPOT > TRAILING > no-op. No IO, no locking, no broker calls — the
//! SL Application Engine (C2) is the only caller, and it alone is
//! responsible for the monotonicity filter, broker constraints, retries,
//! and persistence of the resulting `SlState`.

mod engine;
mod types;

pub use engine::compute_target_sl;
pub use types::SlProposal;
