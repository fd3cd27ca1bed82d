use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, Entity, Quantity, SourceLineId};

/// An allocatable unit (a purchase-order item).
///
/// `total_quantity` is fixed for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    id: SourceLineId,
    total_quantity: Quantity,
}

impl SourceLine {
    pub fn new(id: impl Into<SourceLineId>, total_quantity: impl Into<Quantity>) -> Self {
        Self {
            id: id.into(),
            total_quantity: total_quantity.into(),
        }
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }
}

impl Entity for SourceLine {
    type Id = SourceLineId;

    fn id(&self) -> SourceLineId {
        self.id
    }
}

/// Read-only arena of the source lines loaded for one session.
///
/// Lines keep the order they were supplied in; that order drives every
/// per-line listing (selection, summaries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCatalog {
    lines: Vec<SourceLine>,
    index: HashMap<SourceLineId, usize>,
}

impl SourceCatalog {
    pub fn new(lines: impl IntoIterator<Item = SourceLine>) -> DomainResult<Self> {
        let lines: Vec<SourceLine> = lines.into_iter().collect();
        let mut index = HashMap::with_capacity(lines.len());

        for (pos, line) in lines.iter().enumerate() {
            if line.total_quantity.is_negative() {
                return Err(DomainError::invalid_source_lines(format!(
                    "source line {} has negative total quantity {}",
                    line.id, line.total_quantity
                )));
            }
            if index.insert(line.id, pos).is_some() {
                return Err(DomainError::invalid_source_lines(format!(
                    "duplicate source line id {}",
                    line.id
                )));
            }
        }

        Ok(Self { lines, index })
    }

    pub fn get(&self, id: SourceLineId) -> DomainResult<&SourceLine> {
        self.index
            .get(&id)
            .map(|&pos| &self.lines[pos])
            .ok_or(DomainError::UnknownSourceLine(id))
    }

    pub fn contains(&self, id: SourceLineId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn total_quantity(&self, id: SourceLineId) -> DomainResult<Quantity> {
        self.get(id).map(SourceLine::total_quantity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceLine> {
        self.lines.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = SourceLineId> + '_ {
        self.lines.iter().map(|l| l.id)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
