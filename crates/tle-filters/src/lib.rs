//! Filter Pipeline (P1, §4.10): the fixed-order gate sequence a candidate
//! signal must pass before P2 (entry/lot sizing) ever places an order. The
//! first failing filter short-circuits the rest and the pipeline returns a
//! structured [`FilterRejection`] carrying a stable string code — no filter
//! after the first failure is even evaluated, matching §4.10's "first
//! failing filter short-circuits".

mod pipeline;
mod types;

pub use pipeline::run_filters;
pub use types::{FilterInput, FilterRejection, NewsEvent, SignalCandidate};
