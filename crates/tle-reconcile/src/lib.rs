//! Pure diff logic comparing the position registry's local view against a
//! broker snapshot. No IO, no locking — the registry calls this on every
//! reconciliation pass and applies the resulting backfills/closures itself.

use std::collections::BTreeMap;

use tle_schemas::{Position, Ticket};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileDiff {
    /// Broker has an open position the registry never observed (e.g. after
    /// a restart, or a trade opened by another process). The registry must
    /// backfill it with default SL state.
    Backfilled { ticket: Ticket },
    /// Registry tracked this ticket but the broker no longer reports it open.
    Closed { ticket: Ticket },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconcileReport {
    pub to_backfill: Vec<Position>,
    pub closed: Vec<Ticket>,
    pub diffs: Vec<ReconcileDiff>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.diffs.is_empty()
    }
}

/// Diffs `local` (the registry's current view, keyed by ticket) against
/// `broker_positions` (a fresh `get_positions()` snapshot). Positions present
/// at the broker but absent locally are reported for backfill; tickets
/// present locally but absent at the broker are reported closed.
pub fn reconcile(local: &BTreeMap<Ticket, Position>, broker_positions: &[Position]) -> ReconcileReport {
    let mut diffs = Vec::new();
    let mut to_backfill = Vec::new();
    let mut closed = Vec::new();

    for broker_pos in broker_positions {
        if !local.contains_key(&broker_pos.ticket) {
            diffs.push(ReconcileDiff::Backfilled {
                ticket: broker_pos.ticket,
            });
            to_backfill.push(broker_pos.clone());
        }
    }

    let broker_tickets: BTreeMap<Ticket, ()> =
        broker_positions.iter().map(|p| (p.ticket, ())).collect();

    for ticket in local.keys() {
        if !broker_tickets.contains_key(ticket) {
            diffs.push(ReconcileDiff::Closed { ticket: *ticket });
            closed.push(*ticket);
        }
    }

    ReconcileReport {
        to_backfill,
        closed,
        diffs,
    }
}
