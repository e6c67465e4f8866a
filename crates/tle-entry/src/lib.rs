//! Entry/Lot Sizing (P2, §4.11) and Early-Exit Bypasses (P3, §4.12).
//!
//! Both pipelines sit downstream of the filter gates (`tle-filters`) and
//! upstream/alongside the SL Application Engine: P2 places the initial order
//! and registers the ticket with its first STRICT_LOSS state; P3 closes an
//! already-protected, profitable position early, or closes one for
//! compliance reasons, without ever calling `broker.modify_order` itself —
//! closes go through `broker.close_position`, and the SL machinery (`tle
//! -execution`) remains the only path to a stop-loss modification.

mod bypass;
mod sizing;

pub use bypass::{scan_compliance_closures, scan_micro_profit_closures, ClosureOutcome, CompliancePredicate};
pub use sizing::{place_entry, EntryOutcome};
