//! Position Registry (L3): the authoritative in-memory view of open
//! positions and their SL state. Readers copy a snapshot and iterate outside
//! the lock; writers are the scan loop (new fill), the position monitor
//! (closure/reconciliation), and the SL Application Engine (price/SL update
//! after a successful broker call).

use std::collections::BTreeMap;
use std::sync::RwLock;

use tle_reconcile::{reconcile, ReconcileReport};
use tle_schemas::{Position, SlState, Ticket};

pub struct PositionRegistry {
    positions: RwLock<BTreeMap<Ticket, Position>>,
    sl_states: RwLock<BTreeMap<Ticket, SlState>>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(BTreeMap::new()),
            sl_states: RwLock::new(BTreeMap::new()),
        }
    }

    /// Snapshot of every tracked position, for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<Position> {
        self.positions
            .read()
            .expect("registry positions lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, ticket: Ticket) -> Option<Position> {
        self.positions
            .read()
            .expect("registry positions lock poisoned")
            .get(&ticket)
            .cloned()
    }

    pub fn sl_state(&self, ticket: Ticket) -> Option<SlState> {
        self.sl_states
            .read()
            .expect("registry sl_states lock poisoned")
            .get(&ticket)
            .cloned()
    }

    /// Record a new fill: inserts the position and its initial SL state.
    pub fn record_fill(&self, position: Position, initial_sl_state: SlState) {
        let ticket = position.ticket;
        self.positions
            .write()
            .expect("registry positions lock poisoned")
            .insert(ticket, position);
        self.sl_states
            .write()
            .expect("registry sl_states lock poisoned")
            .insert(ticket, initial_sl_state);
    }

    /// Updates `current_price`/`current_sl` on an existing position and
    /// bumps `version`. No-op if the ticket is no longer tracked (it closed
    /// concurrently).
    pub fn update_price_and_sl(&self, ticket: Ticket, current_price: tle_money::Micros, current_sl: Option<tle_money::Micros>) {
        if let Some(p) = self
            .positions
            .write()
            .expect("registry positions lock poisoned")
            .get_mut(&ticket)
        {
            p.current_price = current_price;
            p.current_sl = current_sl;
            p.version += 1;
        }
    }

    pub fn replace_sl_state(&self, ticket: Ticket, state: SlState) {
        self.sl_states
            .write()
            .expect("registry sl_states lock poisoned")
            .insert(ticket, state);
    }

    /// Removes a ticket entirely, e.g. after `close_position` succeeds.
    pub fn remove(&self, ticket: Ticket) {
        self.positions
            .write()
            .expect("registry positions lock poisoned")
            .remove(&ticket);
        self.sl_states
            .write()
            .expect("registry sl_states lock poisoned")
            .remove(&ticket);
    }

    /// Diffs the registry against a fresh broker snapshot, backfilling any
    /// broker-side position the registry never observed (with a fresh
    /// default SL state) and removing any locally tracked ticket the broker
    /// no longer reports open.
    pub fn reconcile_against_broker(&self, broker_positions: &[Position]) -> ReconcileReport {
        let report = {
            let local = self.positions.read().expect("registry positions lock poisoned");
            reconcile(&local, broker_positions)
        };

        if !report.to_backfill.is_empty() {
            let mut positions = self.positions.write().expect("registry positions lock poisoned");
            let mut sl_states = self.sl_states.write().expect("registry sl_states lock poisoned");
            for pos in &report.to_backfill {
                tracing::warn!(ticket = pos.ticket.raw(), symbol = %pos.symbol, "backfilling broker-side position missed by core");
                let fallback_sl = pos.current_sl.unwrap_or(pos.entry_price);
                sl_states
                    .entry(pos.ticket)
                    .or_insert_with(|| SlState::initial(fallback_sl, pos.opened_at));
                positions.insert(pos.ticket, pos.clone());
            }
        }

        if !report.closed.is_empty() {
            let mut positions = self.positions.write().expect("registry positions lock poisoned");
            let mut sl_states = self.sl_states.write().expect("registry sl_states lock poisoned");
            for ticket in &report.closed {
                tracing::info!(ticket = ticket.raw(), "position no longer open at broker, removing from registry");
                positions.remove(ticket);
                sl_states.remove(ticket);
            }
        }

        report
    }
}

impl Default for PositionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
