use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulfil_core::{
    Aggregate, AggregateRoot, AllocationId, DomainError, Entity, Quantity, SessionId,
    SourceLineId,
};
use fulfil_events::Event;

use crate::ledger;
use crate::source::SourceCatalog;
use crate::validator::Validator;

/// A committed portion of a source line's quantity.
///
/// Allocations are never mutated in place; a quantity change is a removal
/// followed by a new allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    allocation_id: AllocationId,
    source_line_id: SourceLineId,
    quantity: Quantity,
}

impl Allocation {
    pub fn allocation_id(&self) -> AllocationId {
        self.allocation_id
    }

    pub fn source_line_id(&self) -> SourceLineId {
        self.source_line_id
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }
}

impl Entity for Allocation {
    type Id = AllocationId;

    fn id(&self) -> AllocationId {
        self.allocation_id
    }
}

/// A quantity someone wants to draw from a source line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub source_line_id: SourceLineId,
    pub quantity: Quantity,
}

impl Proposal {
    pub fn new(source_line_id: impl Into<SourceLineId>, quantity: impl Into<Quantity>) -> Self {
        Self {
            source_line_id: source_line_id.into(),
            quantity: quantity.into(),
        }
    }
}

/// A proposal refused at commit time, together with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedProposal {
    pub proposal: Proposal,
    pub reason: DomainError,
}

/// Command: CommitBatch.
///
/// `rules` are the same quantity rules the form validated with, so a
/// proposal the form would refuse is refused here too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    pub proposals: Vec<Proposal>,
    pub rules: Validator,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveAllocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveAllocation {
    pub allocation_id: AllocationId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationCommand {
    CommitBatch(CommitBatch),
    RemoveAllocation(RemoveAllocation),
}

/// Event: BatchCommitted.
///
/// One event per batch, so readers never observe a batch half-applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCommitted {
    pub session_id: SessionId,
    pub allocations: Vec<Allocation>,
    pub rejected: Vec<RejectedProposal>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationRemoved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRemoved {
    pub session_id: SessionId,
    pub allocation: Allocation,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationEvent {
    BatchCommitted(BatchCommitted),
    AllocationRemoved(AllocationRemoved),
}

impl Event for AllocationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AllocationEvent::BatchCommitted(_) => "allocation.batch_committed",
            AllocationEvent::AllocationRemoved(_) => "allocation.removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AllocationEvent::BatchCommitted(e) => e.occurred_at,
            AllocationEvent::AllocationRemoved(e) => e.occurred_at,
        }
    }
}

/// Aggregate root: the authoritative, ordered collection of allocations for
/// one session.
///
/// Only `apply` creates or destroys `Allocation` records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSet {
    session_id: SessionId,
    catalog: Arc<SourceCatalog>,
    allocations: Vec<Allocation>,
    next_seq: u64,
    version: u64,
}

impl AllocationSet {
    pub fn new(session_id: SessionId, catalog: Arc<SourceCatalog>) -> Self {
        Self {
            session_id,
            catalog,
            allocations: Vec::new(),
            next_seq: 1,
            version: 0,
        }
    }

    /// Rebuild a set by replaying previously emitted events in order.
    pub fn replay<'a>(
        session_id: SessionId,
        catalog: Arc<SourceCatalog>,
        events: impl IntoIterator<Item = &'a AllocationEvent>,
    ) -> Self {
        let mut set = Self::new(session_id, catalog);
        for event in events {
            set.apply(event);
        }
        set
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// Every allocation, in commit order.
    pub fn all(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Allocations drawing from one line, in commit order.
    pub fn allocations_for(&self, source_line_id: SourceLineId) -> impl Iterator<Item = &Allocation> {
        self.allocations
            .iter()
            .filter(move |a| a.source_line_id == source_line_id)
    }

    pub fn get(&self, allocation_id: AllocationId) -> Option<&Allocation> {
        self.allocations
            .iter()
            .find(|a| a.allocation_id == allocation_id)
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

impl AggregateRoot for AllocationSet {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.session_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for AllocationSet {
    type Command = AllocationCommand;
    type Event = AllocationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AllocationEvent::BatchCommitted(e) => {
                for allocation in &e.allocations {
                    self.next_seq = self.next_seq.max(allocation.allocation_id.seq() + 1);
                    self.allocations.push(allocation.clone());
                }
                for allocation in &e.allocations {
                    self.assert_within_capacity(allocation.source_line_id);
                }
            }
            AllocationEvent::AllocationRemoved(e) => {
                self.allocations
                    .retain(|a| a.allocation_id != e.allocation.allocation_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AllocationCommand::CommitBatch(cmd) => Ok(self.handle_commit(cmd)),
            AllocationCommand::RemoveAllocation(cmd) => Ok(self.handle_remove(cmd)),
        }
    }
}

impl AllocationSet {
    /// Proposals are checked one by one against the capacity left after the
    /// proposals accepted before them in the same batch, so a line named twice
    /// can never be over-committed.
    fn handle_commit(&self, cmd: &CommitBatch) -> Vec<AllocationEvent> {
        if cmd.proposals.is_empty() {
            return Vec::new();
        }

        let mut pending: HashMap<SourceLineId, Quantity> = HashMap::new();
        let mut allocations = Vec::new();
        let mut rejected = Vec::new();
        let mut seq = self.next_seq;

        for proposal in &cmd.proposals {
            let id = proposal.source_line_id;
            let remaining = match self.catalog.total_quantity(id) {
                Ok(total) => {
                    let already = pending.get(&id).copied().unwrap_or(Quantity::ZERO);
                    total - ledger::sum_committed(&self.allocations, id) - already
                }
                Err(reason) => {
                    rejected.push(RejectedProposal {
                        proposal: *proposal,
                        reason,
                    });
                    continue;
                }
            };

            if let Err(e) = cmd.rules.check(proposal.quantity, remaining) {
                rejected.push(RejectedProposal {
                    proposal: *proposal,
                    reason: e.into(),
                });
                continue;
            }

            *pending.entry(id).or_insert(Quantity::ZERO) += proposal.quantity;
            allocations.push(Allocation {
                allocation_id: AllocationId::new(id, seq),
                source_line_id: id,
                quantity: proposal.quantity,
            });
            seq += 1;
        }

        vec![AllocationEvent::BatchCommitted(BatchCommitted {
            session_id: self.session_id,
            allocations,
            rejected,
            occurred_at: cmd.occurred_at,
        })]
    }

    /// Unknown ids produce no event: a second click on "remove" is a no-op.
    fn handle_remove(&self, cmd: &RemoveAllocation) -> Vec<AllocationEvent> {
        match self.get(cmd.allocation_id) {
            Some(allocation) => vec![AllocationEvent::AllocationRemoved(AllocationRemoved {
                session_id: self.session_id,
                allocation: allocation.clone(),
                occurred_at: cmd.occurred_at,
            })],
            None => Vec::new(),
        }
    }

    fn assert_within_capacity(&self, id: SourceLineId) {
        let committed = ledger::sum_committed(&self.allocations, id);
        let total = self
            .catalog
            .total_quantity(id)
            .unwrap_or(Quantity::ZERO);
        assert!(
            !committed.is_negative() && committed <= total,
            "allocation invariant broken for source line {id}: committed {committed} of {total}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceLine;
    use fulfil_core::ValidationError;

    fn test_catalog() -> Arc<SourceCatalog> {
        Arc::new(SourceCatalog::new([SourceLine::new(1, 100), SourceLine::new(2, 5)]).unwrap())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn commit(set: &AllocationSet, proposals: Vec<Proposal>) -> BatchCommitted {
        let events = set
            .handle(&AllocationCommand::CommitBatch(CommitBatch {
                proposals,
                rules: Validator::default(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
        match events.into_iter().next() {
            Some(AllocationEvent::BatchCommitted(e)) => e,
            other => panic!("Expected BatchCommitted event, got {other:?}"),
        }
    }

    #[test]
    fn commit_assigns_fresh_sequential_ids() {
        let mut set = AllocationSet::new(SessionId::new(), test_catalog());
        let e = commit(&set, vec![Proposal::new(1, 10), Proposal::new(1, 20)]);
        assert_eq!(e.allocations.len(), 2);
        assert_eq!(e.allocations[0].allocation_id().to_string(), "1-1");
        assert_eq!(e.allocations[1].allocation_id().to_string(), "1-2");

        set.apply(&AllocationEvent::BatchCommitted(e));
        let e = commit(&set, vec![Proposal::new(1, 5)]);
        assert_eq!(e.allocations[0].allocation_id().seq(), 3);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let set = AllocationSet::new(SessionId::new(), test_catalog());
        let before = set.clone();
        let _ = commit(&set, vec![Proposal::new(1, 10)]);
        assert_eq!(set, before);
        assert_eq!(set.version(), 0);
    }

    #[test]
    fn same_line_twice_in_one_batch_cannot_overcommit() {
        let set = AllocationSet::new(SessionId::new(), test_catalog());
        let e = commit(&set, vec![Proposal::new(2, 3), Proposal::new(2, 3)]);
        assert_eq!(e.allocations.len(), 1);
        assert_eq!(e.rejected.len(), 1);
        assert_eq!(
            e.rejected[0].reason,
            DomainError::Validation(ValidationError::ExceedsRemaining {
                requested: Quantity::from(3),
                remaining: Quantity::from(2),
            })
        );
    }

    #[test]
    fn unknown_and_non_positive_proposals_are_rejected_individually() {
        let set = AllocationSet::new(SessionId::new(), test_catalog());
        let e = commit(
            &set,
            vec![Proposal::new(9, 1), Proposal::new(1, 0), Proposal::new(1, 4)],
        );
        assert_eq!(e.allocations.len(), 1);
        assert_eq!(e.allocations[0].quantity(), Quantity::from(4));
        assert_eq!(
            e.rejected[0].reason,
            DomainError::UnknownSourceLine(SourceLineId::new(9))
        );
        assert!(matches!(
            e.rejected[1].reason,
            DomainError::Validation(ValidationError::NonPositive { .. })
        ));
    }

    #[test]
    fn commit_applies_the_same_precision_rule_as_the_form() {
        let set = AllocationSet::new(SessionId::new(), test_catalog());
        let too_fine = Quantity::parse("2.123456").unwrap();
        let e = commit(&set, vec![Proposal::new(1, too_fine), Proposal::new(1, 2)]);
        assert_eq!(e.allocations.len(), 1);
        assert_eq!(e.allocations[0].quantity(), Quantity::from(2));
        assert_eq!(
            e.rejected[0].reason,
            DomainError::Validation(ValidationError::TooPrecise {
                quantity: too_fine,
                max_fraction_digits: 4,
            })
        );
    }

    #[test]
    fn empty_batch_emits_nothing() {
        let set = AllocationSet::new(SessionId::new(), test_catalog());
        let events = set
            .handle(&AllocationCommand::CommitBatch(CommitBatch {
                proposals: vec![],
                rules: Validator::default(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn remove_unknown_id_emits_nothing() {
        let set = AllocationSet::new(SessionId::new(), test_catalog());
        let events = set
            .handle(&AllocationCommand::RemoveAllocation(RemoveAllocation {
                allocation_id: AllocationId::new(SourceLineId::new(1), 1),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn removed_ids_are_never_reused() {
        let mut set = AllocationSet::new(SessionId::new(), test_catalog());
        let e = commit(&set, vec![Proposal::new(1, 10)]);
        let first = e.allocations[0].allocation_id();
        set.apply(&AllocationEvent::BatchCommitted(e));

        let events = set
            .handle(&AllocationCommand::RemoveAllocation(RemoveAllocation {
                allocation_id: first,
                occurred_at: test_time(),
            }))
            .unwrap();
        set.apply(&events[0]);
        assert!(set.is_empty());

        let e = commit(&set, vec![Proposal::new(1, 10)]);
        assert_ne!(e.allocations[0].allocation_id(), first);
    }

    #[test]
    fn replay_reproduces_state() {
        let mut set = AllocationSet::new(SessionId::new(), test_catalog());
        let mut history = Vec::new();
        for proposals in [
            vec![Proposal::new(1, 10), Proposal::new(2, 5)],
            vec![Proposal::new(1, 30)],
        ] {
            let e = AllocationEvent::BatchCommitted(commit(&set, proposals));
            set.apply(&e);
            history.push(e);
        }

        let replayed = AllocationSet::replay(set.session_id(), test_catalog(), &history);
        assert_eq!(replayed.all(), set.all());
        assert_eq!(replayed.version(), set.version());
    }

    #[test]
    #[should_panic(expected = "allocation invariant broken")]
    fn applying_an_overcommitting_event_panics() {
        let mut set = AllocationSet::new(SessionId::new(), test_catalog());
        let bogus = AllocationEvent::BatchCommitted(BatchCommitted {
            session_id: set.session_id(),
            allocations: vec![Allocation {
                allocation_id: AllocationId::new(SourceLineId::new(2), 1),
                source_line_id: SourceLineId::new(2),
                quantity: Quantity::from(6),
            }],
            rejected: vec![],
            occurred_at: test_time(),
        });
        set.apply(&bogus);
    }
}
