//! Domain error model.

use thiserror::Error;

use crate::id::{AllocationId, SourceLineId};
use crate::value_object::Quantity;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Why a user-entered quantity was refused.
///
/// Every variant carries the exact value the user typed (or its parsed form)
/// so the form can render it back next to the row.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The input does not parse to a finite number.
    #[error("not a number: {input:?}")]
    NotANumber { input: String },

    /// Zero or negative commitments are meaningless.
    #[error("quantity must be positive (got {quantity})")]
    NonPositive { quantity: Quantity },

    /// More fraction digits than the session accepts.
    #[error("quantity {quantity} has more than {max_fraction_digits} fraction digits")]
    TooPrecise {
        quantity: Quantity,
        max_fraction_digits: u32,
    },

    /// The proposal is larger than what is left on the source line.
    #[error("quantity {requested} exceeds remaining {remaining}")]
    ExceedsRemaining {
        requested: Quantity,
        remaining: Quantity,
    },
}

/// Domain-level error.
///
/// All variants are recoverable, user-facing conditions. Internal invariant
/// breaches are assertions, not values of this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The id is not among the source lines loaded for this session.
    #[error("unknown source line: {0}")]
    UnknownSourceLine(SourceLineId),

    /// A proposed quantity failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Exhausted lines can never be selected.
    #[error("source line {0} is exhausted and cannot be selected")]
    CannotSelectExhausted(SourceLineId),

    /// The supplied source list is unusable (duplicate ids, negative totals).
    #[error("invalid source lines: {0}")]
    InvalidSourceLines(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The allocation does not exist (only raised where silence would lose
    /// user input, e.g. replacing a quantity).
    #[error("unknown allocation: {0}")]
    UnknownAllocation(AllocationId),
}

impl DomainError {
    pub fn invalid_source_lines(msg: impl Into<String>) -> Self {
        Self::InvalidSourceLines(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// The validation failure, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            DomainError::Validation(e) => Some(e),
            _ => None,
        }
    }
}
