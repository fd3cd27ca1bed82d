//! Per-line committed/remaining accounting.
//!
//! The ledger is a read model over allocation events. It never keeps counters
//! of its own that are not derivable from the allocation set:
//! `Ledger::rebuild` from the set and the incrementally projected ledger are
//! always equal.

use std::collections::HashMap;
use std::sync::Arc;

use fulfil_core::{AggregateRoot, DomainResult, Quantity, SourceLineId};
use fulfil_events::{EventEnvelope, Projection};

use crate::allocation::{Allocation, AllocationEvent, AllocationSet};
use crate::source::SourceCatalog;

/// Sum of allocated quantity for one line.
pub fn sum_committed(allocations: &[Allocation], source_line_id: SourceLineId) -> Quantity {
    allocations
        .iter()
        .filter(|a| a.source_line_id() == source_line_id)
        .map(Allocation::quantity)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    catalog: Arc<SourceCatalog>,
    /// Only lines with a non-zero commitment have an entry.
    committed: HashMap<SourceLineId, Quantity>,
    last_sequence: u64,
}

impl Ledger {
    pub fn new(catalog: Arc<SourceCatalog>) -> Self {
        Self {
            catalog,
            committed: HashMap::new(),
            last_sequence: 0,
        }
    }

    /// Derive the ledger from scratch out of the current allocation set.
    pub fn rebuild(catalog: Arc<SourceCatalog>, set: &AllocationSet) -> Self {
        let mut committed: HashMap<SourceLineId, Quantity> = HashMap::new();
        for allocation in set.all() {
            *committed
                .entry(allocation.source_line_id())
                .or_insert(Quantity::ZERO) += allocation.quantity();
        }
        Self {
            catalog,
            committed,
            last_sequence: set.version(),
        }
    }

    /// `total - committed`. Fails with `UnknownSourceLine` for ids outside
    /// the catalog.
    pub fn remaining(&self, source_line_id: SourceLineId) -> DomainResult<Quantity> {
        let total = self.catalog.total_quantity(source_line_id)?;
        Ok(total - self.committed_unchecked(source_line_id))
    }

    /// Sum over current allocations; zero when the line has none.
    pub fn committed(&self, source_line_id: SourceLineId) -> DomainResult<Quantity> {
        self.catalog.get(source_line_id)?;
        Ok(self.committed_unchecked(source_line_id))
    }

    pub fn is_exhausted(&self, source_line_id: SourceLineId) -> DomainResult<bool> {
        Ok(self.remaining(source_line_id)?.is_zero())
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// Sequence number of the last envelope folded into this ledger.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    fn committed_unchecked(&self, source_line_id: SourceLineId) -> Quantity {
        self.committed
            .get(&source_line_id)
            .copied()
            .unwrap_or(Quantity::ZERO)
    }

    fn add(&mut self, source_line_id: SourceLineId, quantity: Quantity) {
        *self
            .committed
            .entry(source_line_id)
            .or_insert(Quantity::ZERO) += quantity;
    }

    fn subtract(&mut self, source_line_id: SourceLineId, quantity: Quantity) {
        if let Some(current) = self.committed.get_mut(&source_line_id) {
            *current -= quantity;
            if current.is_zero() {
                self.committed.remove(&source_line_id);
            }
        }
    }

    fn assert_conserved(&self, source_line_id: SourceLineId) {
        let committed = self.committed_unchecked(source_line_id);
        let total = self
            .catalog
            .total_quantity(source_line_id)
            .unwrap_or(Quantity::ZERO);
        assert!(
            !committed.is_negative() && committed <= total,
            "ledger invariant broken for source line {source_line_id}: committed {committed} of {total}"
        );
    }
}

impl Projection for Ledger {
    type Ev = AllocationEvent;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>) {
        if envelope.sequence_number() <= self.last_sequence {
            return;
        }

        match envelope.payload() {
            AllocationEvent::BatchCommitted(e) => {
                for allocation in &e.allocations {
                    self.add(allocation.source_line_id(), allocation.quantity());
                }
                for allocation in &e.allocations {
                    self.assert_conserved(allocation.source_line_id());
                }
            }
            AllocationEvent::AllocationRemoved(e) => {
                let id = e.allocation.source_line_id();
                self.subtract(id, e.allocation.quantity());
                self.assert_conserved(id);
            }
        }

        self.last_sequence = envelope.sequence_number();
    }
}
