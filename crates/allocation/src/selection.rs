//! Which source lines are marked for the next "add selected items" action.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, SourceLineId};

use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    Available,
    Selected,
    Exhausted,
}

/// Keeps `{available, selected, exhausted}` consistent with the ledger.
///
/// `Exhausted` is never stored on its own authority: it is recomputed from
/// the ledger on every transition and always wins over `Selected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCoordinator {
    order: Vec<SourceLineId>,
    states: HashMap<SourceLineId, SelectionState>,
}

impl SelectionCoordinator {
    pub fn new(ledger: &Ledger) -> Self {
        let order: Vec<SourceLineId> = ledger.catalog().ids().collect();
        let mut coordinator = Self {
            states: order
                .iter()
                .map(|&id| (id, SelectionState::Available))
                .collect(),
            order,
        };
        coordinator.refresh_all(ledger);
        coordinator
    }

    pub fn state(&self, source_line_id: SourceLineId) -> DomainResult<SelectionState> {
        self.states
            .get(&source_line_id)
            .copied()
            .ok_or(DomainError::UnknownSourceLine(source_line_id))
    }

    /// Selected lines, in catalog order.
    pub fn selected(&self) -> Vec<SourceLineId> {
        self.ids_in(SelectionState::Selected)
    }

    pub fn exhausted(&self) -> Vec<SourceLineId> {
        self.ids_in(SelectionState::Exhausted)
    }

    /// Flip `available <-> selected`.
    pub fn toggle_select(
        &mut self,
        ledger: &Ledger,
        source_line_id: SourceLineId,
    ) -> DomainResult<SelectionState> {
        let next = match self.refresh(ledger, source_line_id)? {
            SelectionState::Exhausted => {
                return Err(DomainError::CannotSelectExhausted(source_line_id));
            }
            SelectionState::Available => SelectionState::Selected,
            SelectionState::Selected => SelectionState::Available,
        };
        self.states.insert(source_line_id, next);
        Ok(next)
    }

    /// Select every line that is not exhausted.
    pub fn select_all(&mut self, ledger: &Ledger) {
        self.refresh_all(ledger);
        for state in self.states.values_mut() {
            if *state == SelectionState::Available {
                *state = SelectionState::Selected;
            }
        }
    }

    pub fn clear_selection(&mut self) {
        for state in self.states.values_mut() {
            if *state == SelectionState::Selected {
                *state = SelectionState::Available;
            }
        }
    }

    /// After a batch commit: committed lines are deselected and their
    /// exhaustion recomputed.
    pub fn on_commit(&mut self, ledger: &Ledger, committed: &HashSet<SourceLineId>) {
        for &id in committed {
            if let Some(state) = self.states.get_mut(&id) {
                if *state == SelectionState::Selected {
                    *state = SelectionState::Available;
                }
            }
            let refreshed = self.refresh(ledger, id);
            debug_assert!(refreshed.is_ok(), "committed line {id} is not in the catalog");
        }
    }

    /// After a removal: an exhausted line with capacity again becomes
    /// `available`, never `selected`.
    pub fn on_remove(&mut self, ledger: &Ledger, source_line_id: SourceLineId) {
        let refreshed = self.refresh(ledger, source_line_id);
        debug_assert!(
            refreshed.is_ok(),
            "removed allocation's line {source_line_id} is not in the catalog"
        );
    }

    /// Re-derive exhaustion for every line.
    pub fn refresh_all(&mut self, ledger: &Ledger) {
        for id in self.order.clone() {
            let refreshed = self.refresh(ledger, id);
            debug_assert!(refreshed.is_ok(), "catalog line {id} has no selection state");
        }
    }

    fn refresh(&mut self, ledger: &Ledger, source_line_id: SourceLineId) -> DomainResult<SelectionState> {
        let exhausted = ledger.is_exhausted(source_line_id)?;
        let state = self
            .states
            .get_mut(&source_line_id)
            .ok_or(DomainError::UnknownSourceLine(source_line_id))?;
        *state = match (*state, exhausted) {
            (_, true) => SelectionState::Exhausted,
            (SelectionState::Exhausted, false) => SelectionState::Available,
            (current, false) => current,
        };
        Ok(*state)
    }

    fn ids_in(&self, wanted: SelectionState) -> Vec<SourceLineId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.states.get(id) == Some(&wanted))
            .collect()
    }
}
