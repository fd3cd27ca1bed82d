//! One allocation session: the facade the item-selection screens talk to.
//!
//! A session owns the source catalog, the allocation set, the ledger, the
//! selection coordinator and the (ephemeral) per-line proposal buffer. Every
//! mutation goes through [`Session::execute`], which applies events to the
//! set, folds them into the ledger and appends them to the journal in one
//! step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use fulfil_core::{
    Aggregate, AggregateRoot, AllocationId, DomainError, DomainResult, Entity, Quantity,
    SessionId, SourceLineId, ValidationError,
};
use fulfil_events::{Event, EventEnvelope, Projection};

use crate::allocation::{
    Allocation, AllocationCommand, AllocationEvent, AllocationSet, CommitBatch, Proposal,
    RejectedProposal, RemoveAllocation,
};
use crate::config::AllocatorConfig;
use crate::ledger::Ledger;
use crate::selection::{SelectionCoordinator, SelectionState};
use crate::source::{SourceCatalog, SourceLine};
use crate::validator::{ValidQuantity, Validator};

/// Result of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Allocations created, in commit order.
    pub created: Vec<Allocation>,
    /// Proposals that passed row validation but were refused at commit time.
    pub rejected: Vec<RejectedProposal>,
    /// Rows that failed validation before the commit (input left in place).
    pub row_errors: Vec<(SourceLineId, ValidationError)>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.row_errors.is_empty()
    }
}

/// Per-line figures for the "LR Qty" / "Total Received Qty" columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineSummary {
    pub source_line_id: SourceLineId,
    pub total_quantity: Quantity,
    pub committed: Quantity,
    pub remaining: Quantity,
    pub state: SelectionState,
    pub allocation_count: usize,
}

/// One row of the create/update request handed to the payload builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionLine {
    pub allocation_id: AllocationId,
    pub source_line_id: SourceLineId,
    pub quantity: Quantity,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    catalog: Arc<SourceCatalog>,
    set: AllocationSet,
    ledger: Ledger,
    selection: SelectionCoordinator,
    validator: Validator,
    proposals: HashMap<SourceLineId, String>,
    journal: Vec<EventEnvelope<AllocationEvent>>,
}

impl Session {
    /// Start a session over a freshly fetched source list.
    ///
    /// A new source list always means a new session.
    pub fn new(
        lines: impl IntoIterator<Item = SourceLine>,
        config: AllocatorConfig,
    ) -> DomainResult<Self> {
        let id = SessionId::new();
        let catalog = Arc::new(SourceCatalog::new(lines)?);
        let ledger = Ledger::new(catalog.clone());
        let selection = SelectionCoordinator::new(&ledger);

        tracing::info!(session_id = %id, lines = catalog.len(), "allocation session started");

        Ok(Self {
            id,
            set: AllocationSet::new(id, catalog.clone()),
            catalog,
            ledger,
            selection,
            validator: Validator::new(&config),
            proposals: HashMap::new(),
            journal: Vec::new(),
        })
    }

    pub fn with_defaults(lines: impl IntoIterator<Item = SourceLine>) -> DomainResult<Self> {
        Self::new(lines, AllocatorConfig::default())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn allocation_set(&self) -> &AllocationSet {
        &self.set
    }

    pub fn journal(&self) -> &[EventEnvelope<AllocationEvent>] {
        &self.journal
    }

    // -- ledger ----------------------------------------------------------

    pub fn remaining(&self, source_line_id: SourceLineId) -> DomainResult<Quantity> {
        self.ledger.remaining(source_line_id)
    }

    pub fn committed(&self, source_line_id: SourceLineId) -> DomainResult<Quantity> {
        self.ledger.committed(source_line_id)
    }

    // -- validation and proposals ---------------------------------------

    pub fn validate(&self, source_line_id: SourceLineId, raw: &str) -> DomainResult<ValidQuantity> {
        self.validator.validate(&self.ledger, source_line_id, raw)
    }

    /// Remember what the user typed for a row.
    pub fn set_proposal(&mut self, source_line_id: SourceLineId, raw: impl Into<String>) -> DomainResult<()> {
        self.catalog.get(source_line_id)?;
        self.proposals.insert(source_line_id, raw.into());
        Ok(())
    }

    pub fn proposal(&self, source_line_id: SourceLineId) -> Option<&str> {
        self.proposals.get(&source_line_id).map(String::as_str)
    }

    pub fn clear_proposal(&mut self, source_line_id: SourceLineId) {
        self.proposals.remove(&source_line_id);
    }

    // -- selection -------------------------------------------------------

    pub fn state(&self, source_line_id: SourceLineId) -> DomainResult<SelectionState> {
        self.selection.state(source_line_id)
    }

    pub fn selected(&self) -> Vec<SourceLineId> {
        self.selection.selected()
    }

    pub fn toggle_select(&mut self, source_line_id: SourceLineId) -> DomainResult<SelectionState> {
        self.selection.toggle_select(&self.ledger, source_line_id)
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.ledger);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear_selection();
    }

    // -- mutations -------------------------------------------------------

    /// The "add selected items" action.
    ///
    /// Each selected row's buffered input is validated against the ledger as
    /// it stood before this action. Valid rows are committed as one batch;
    /// invalid rows keep their input and selection and come back in
    /// `row_errors`.
    pub fn add_selected(&mut self) -> DomainResult<BatchOutcome> {
        let selected = self.selection.selected();
        let rows: Vec<(SourceLineId, &str)> = selected
            .iter()
            .map(|&id| (id, self.proposal(id).unwrap_or("")))
            .collect();
        let (accepted, row_errors) = self.validator.validate_rows(&self.ledger, rows)?;

        for (id, error) in &row_errors {
            tracing::debug!(session_id = %self.id, source_line_id = %id, %error, "row left in form");
        }

        let mut outcome = self.commit_batch(accepted)?;
        for allocation in &outcome.created {
            self.proposals.remove(&allocation.source_line_id());
        }
        outcome.row_errors = row_errors;
        Ok(outcome)
    }

    /// Commit proposals as one batch.
    ///
    /// Each proposal is re-checked against the capacity left at commit time;
    /// refused ones are skipped and reported, the rest land together.
    pub fn commit_batch(&mut self, proposals: Vec<Proposal>) -> DomainResult<BatchOutcome> {
        let outcome = self.commit_proposals(proposals)?;

        let committed: HashSet<SourceLineId> = outcome
            .created
            .iter()
            .map(Allocation::source_line_id)
            .collect();
        self.selection.on_commit(&self.ledger, &committed);

        Ok(outcome)
    }

    /// Commit without touching the selection.
    fn commit_proposals(&mut self, proposals: Vec<Proposal>) -> DomainResult<BatchOutcome> {
        let events = self.execute(AllocationCommand::CommitBatch(CommitBatch {
            proposals,
            rules: self.validator,
            occurred_at: Utc::now(),
        }))?;

        let mut outcome = BatchOutcome::default();
        for event in events {
            if let AllocationEvent::BatchCommitted(e) = event {
                outcome.created.extend(e.allocations);
                outcome.rejected.extend(e.rejected);
            }
        }

        for allocation in &outcome.created {
            tracing::info!(
                session_id = %self.id,
                allocation_id = %allocation.allocation_id(),
                source_line_id = %allocation.source_line_id(),
                quantity = %allocation.quantity(),
                "allocation committed"
            );
        }
        for rejected in &outcome.rejected {
            tracing::warn!(
                session_id = %self.id,
                source_line_id = %rejected.proposal.source_line_id,
                quantity = %rejected.proposal.quantity,
                reason = %rejected.reason,
                "proposal refused at commit time"
            );
        }

        Ok(outcome)
    }

    /// Remove an allocation. Unknown ids are a no-op.
    pub fn remove(&mut self, allocation_id: AllocationId) -> DomainResult<()> {
        let events = self.execute(AllocationCommand::RemoveAllocation(RemoveAllocation {
            allocation_id,
            occurred_at: Utc::now(),
        }))?;

        if events.is_empty() {
            tracing::debug!(session_id = %self.id, %allocation_id, "remove ignored, allocation not present");
            return Ok(());
        }

        tracing::info!(session_id = %self.id, %allocation_id, "allocation removed");
        self.selection
            .on_remove(&self.ledger, allocation_id.source_line_id());
        Ok(())
    }

    /// Change an allocation's quantity (remove + re-add).
    ///
    /// The new quantity is validated against what would be left with the old
    /// allocation given back. On failure nothing changes. The line keeps its
    /// selection unless the new quantity exhausts it.
    pub fn replace(&mut self, allocation_id: AllocationId, raw: &str) -> DomainResult<Allocation> {
        let existing = self
            .set
            .get(allocation_id)
            .cloned()
            .ok_or(DomainError::UnknownAllocation(allocation_id))?;
        let line = existing.source_line_id();
        let available = self.ledger.remaining(line)? + existing.quantity();
        let quantity = self.validator.validate_against(raw, available)?;

        self.execute(AllocationCommand::RemoveAllocation(RemoveAllocation {
            allocation_id,
            occurred_at: Utc::now(),
        }))?;
        let outcome = self.commit_proposals(vec![Proposal::new(line, quantity)])?;
        self.selection.on_remove(&self.ledger, line);

        let created = outcome.created.into_iter().next().ok_or_else(|| {
            DomainError::Validation(ValidationError::ExceedsRemaining {
                requested: quantity.get(),
                remaining: available,
            })
        })?;

        tracing::info!(
            session_id = %self.id,
            from = %allocation_id,
            to = %created.allocation_id(),
            quantity = %created.quantity(),
            "allocation replaced"
        );
        Ok(created)
    }

    // -- read views ------------------------------------------------------

    pub fn all(&self) -> &[Allocation] {
        self.set.all()
    }

    pub fn allocations_for(&self, source_line_id: SourceLineId) -> Vec<&Allocation> {
        self.set.allocations_for(source_line_id).collect()
    }

    pub fn line_summaries(&self) -> Vec<LineSummary> {
        self.catalog
            .iter()
            .filter_map(|line| {
                let id = line.id();
                Some(LineSummary {
                    source_line_id: id,
                    total_quantity: line.total_quantity(),
                    committed: self.ledger.committed(id).ok()?,
                    remaining: self.ledger.remaining(id).ok()?,
                    state: self.selection.state(id).ok()?,
                    allocation_count: self.set.allocations_for(id).count(),
                })
            })
            .collect()
    }

    /// The final `all()` view in the shape the payload builder serialises.
    pub fn submission(&self) -> Vec<SubmissionLine> {
        self.set
            .all()
            .iter()
            .map(|a| SubmissionLine {
                allocation_id: a.allocation_id(),
                source_line_id: a.source_line_id(),
                quantity: a.quantity(),
            })
            .collect()
    }

    /// Handle a command, apply its events to the set and the ledger, and
    /// journal them.
    fn execute(&mut self, command: AllocationCommand) -> DomainResult<Vec<AllocationEvent>> {
        let events = self.set.handle(&command)?;
        for event in &events {
            self.set.apply(event);
            let envelope =
                EventEnvelope::new(Uuid::now_v7(), self.id, self.set.version(), event.clone());
            self.ledger.apply(&envelope);
            tracing::debug!(
                session_id = %envelope.session_id(),
                event_id = %envelope.event_id(),
                sequence = envelope.sequence_number(),
                event_type = event.event_type(),
                event_version = event.version(),
                occurred_at = %event.occurred_at(),
                "event journaled"
            );
            self.journal.push(envelope);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> SourceLineId {
        SourceLineId::new(raw)
    }

    fn test_session() -> Session {
        Session::with_defaults([SourceLine::new(1, 100), SourceLine::new(2, 20)]).unwrap()
    }

    #[test]
    fn add_selected_commits_valid_rows_and_keeps_bad_ones() {
        let mut session = test_session();
        session.toggle_select(id(1)).unwrap();
        session.toggle_select(id(2)).unwrap();
        session.set_proposal(id(1), "40").unwrap();
        session.set_proposal(id(2), "25").unwrap();

        let outcome = session.add_selected().unwrap();

        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].source_line_id(), id(1));
        assert_eq!(
            outcome.row_errors,
            vec![(
                id(2),
                ValidationError::ExceedsRemaining {
                    requested: Quantity::from(25),
                    remaining: Quantity::from(20),
                }
            )]
        );
        assert_eq!(session.proposal(id(1)), None);
        assert_eq!(session.proposal(id(2)), Some("25"));
        assert_eq!(session.state(id(1)).unwrap(), SelectionState::Available);
        assert_eq!(session.state(id(2)).unwrap(), SelectionState::Selected);
    }

    #[test]
    fn selected_row_without_input_is_not_a_number() {
        let mut session = test_session();
        session.toggle_select(id(1)).unwrap();
        let outcome = session.add_selected().unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(
            outcome.row_errors,
            vec![(id(1), ValidationError::NotANumber { input: String::new() })]
        );
        assert!(session.journal().is_empty());
    }

    #[test]
    fn duplicate_rows_in_one_batch_are_caught_at_commit() {
        let mut session = test_session();
        let outcome = session
            .commit_batch(vec![Proposal::new(2, 15), Proposal::new(2, 15)])
            .unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(!outcome.is_clean());
        assert_eq!(session.remaining(id(2)).unwrap(), Quantity::from(5));
    }

    #[test]
    fn replace_changes_quantity_or_leaves_everything_alone() {
        let mut session = test_session();
        let original = session
            .commit_batch(vec![Proposal::new(1, 40)])
            .unwrap()
            .created
            .remove(0);

        let err = session.replace(original.allocation_id(), "101").unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation(ValidationError::ExceedsRemaining {
                requested: Quantity::from(101),
                remaining: Quantity::from(100),
            })
        );
        assert_eq!(session.all(), &[original.clone()]);

        let replaced = session.replace(original.allocation_id(), "100").unwrap();
        assert_eq!(replaced.quantity(), Quantity::from(100));
        assert_ne!(replaced.allocation_id(), original.allocation_id());
        assert_eq!(session.all(), &[replaced]);
        assert_eq!(session.state(id(1)).unwrap(), SelectionState::Exhausted);
    }

    #[test]
    fn replace_keeps_the_selection_of_the_line() {
        let mut session = test_session();
        let original = session
            .commit_batch(vec![Proposal::new(1, 40)])
            .unwrap()
            .created
            .remove(0);
        session.toggle_select(id(1)).unwrap();

        let replaced = session.replace(original.allocation_id(), "20").unwrap();
        assert_eq!(session.state(id(1)).unwrap(), SelectionState::Selected);

        session.replace(replaced.allocation_id(), "100").unwrap();
        assert_eq!(session.state(id(1)).unwrap(), SelectionState::Exhausted);
    }

    #[test]
    fn commit_batch_refuses_what_validate_refuses() {
        let mut session = test_session();
        let too_fine = Quantity::parse("2.123456").unwrap();
        assert!(session.validate(id(1), "2.123456").is_err());

        let outcome = session
            .commit_batch(vec![Proposal::new(1, too_fine)])
            .unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(
            outcome.rejected[0].reason,
            DomainError::Validation(ValidationError::TooPrecise {
                quantity: too_fine,
                max_fraction_digits: 4,
            })
        );
        assert_eq!(session.committed(id(1)).unwrap(), Quantity::ZERO);
    }

    #[test]
    fn replace_unknown_allocation_fails() {
        let mut session = test_session();
        let missing = AllocationId::new(id(1), 99);
        assert_eq!(
            session.replace(missing, "1").unwrap_err(),
            DomainError::UnknownAllocation(missing)
        );
    }

    #[test]
    fn proposals_for_unknown_lines_are_refused() {
        let mut session = test_session();
        assert_eq!(
            session.set_proposal(id(7), "1").unwrap_err(),
            DomainError::UnknownSourceLine(id(7))
        );
    }

    #[test]
    fn summaries_and_submission_follow_the_ledger() {
        let mut session = test_session();
        session
            .commit_batch(vec![Proposal::new(1, 30), Proposal::new(2, 20), Proposal::new(1, 5)])
            .unwrap();

        let summaries = session.line_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].committed, Quantity::from(35));
        assert_eq!(summaries[0].remaining, Quantity::from(65));
        assert_eq!(summaries[0].allocation_count, 2);
        assert_eq!(summaries[1].state, SelectionState::Exhausted);

        let payload = serde_json::to_value(session.submission()).unwrap();
        assert_eq!(
            payload,
            serde_json::json!([
                {"allocation_id": "1-1", "source_line_id": 1, "quantity": "30"},
                {"allocation_id": "2-2", "source_line_id": 2, "quantity": "20"},
                {"allocation_id": "1-3", "source_line_id": 1, "quantity": "5"},
            ])
        );
    }

    #[test]
    fn journal_replays_into_the_same_state() {
        let mut session = test_session();
        session
            .commit_batch(vec![Proposal::new(1, 30), Proposal::new(2, 20)])
            .unwrap();
        let first = session.all()[0].allocation_id();
        session.remove(first).unwrap();
        session.remove(first).unwrap();

        assert_eq!(session.journal().len(), 2);
        assert!(session.journal().iter().all(|e| e.session_id() == session.id()));
        assert_eq!(
            session
                .journal()
                .iter()
                .map(|e| e.payload().event_type())
                .collect::<Vec<_>>(),
            vec!["allocation.batch_committed", "allocation.removed"]
        );
        assert!(session.journal().iter().all(|e| e.payload().version() == 1));
        assert_ne!(session.journal()[0].event_id(), session.journal()[1].event_id());
        assert_eq!(
            session
                .journal()
                .iter()
                .map(|e| e.sequence_number())
                .collect::<Vec<_>>(),
            vec![1, 2]
        );

        let replayed = AllocationSet::replay(
            session.id(),
            Arc::new(session.catalog().clone()),
            session.journal().iter().map(|e| e.payload()),
        );
        assert_eq!(replayed.all(), session.all());
        assert_eq!(
            &Ledger::rebuild(Arc::new(session.catalog().clone()), &replayed),
            session.ledger()
        );
    }
}
