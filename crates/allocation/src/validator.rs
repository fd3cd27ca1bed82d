//! Gatekeeper between user-typed quantities and the allocation set.

use fulfil_core::{DomainError, DomainResult, Quantity, SourceLineId, ValidationError};

use crate::allocation::Proposal;
use crate::config::AllocatorConfig;
use crate::ledger::Ledger;

/// A quantity that passed validation, exactly as the user typed it.
///
/// Only the validator hands these out; there is no clamping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ValidQuantity(Quantity);

impl ValidQuantity {
    pub fn get(&self) -> Quantity {
        self.0
    }
}

impl From<ValidQuantity> for Quantity {
    fn from(value: ValidQuantity) -> Self {
        value.0
    }
}

/// Quantity rules shared by form validation and commit-time re-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    max_fraction_digits: u32,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&AllocatorConfig::default())
    }
}

impl Validator {
    pub fn new(config: &AllocatorConfig) -> Self {
        Self {
            max_fraction_digits: config.max_fraction_digits,
        }
    }

    pub fn max_fraction_digits(&self) -> u32 {
        self.max_fraction_digits
    }

    /// Check `raw` against what the ledger says is left on the line.
    pub fn validate(
        &self,
        ledger: &Ledger,
        source_line_id: SourceLineId,
        raw: &str,
    ) -> DomainResult<ValidQuantity> {
        let remaining = ledger.remaining(source_line_id)?;
        let valid = self.validate_against(raw, remaining);
        match &valid {
            Ok(q) => tracing::debug!(%source_line_id, quantity = %q.get(), "proposal accepted"),
            Err(e) => tracing::debug!(%source_line_id, input = raw, error = %e, "proposal rejected"),
        }
        Ok(valid?)
    }

    /// Check `raw` against an explicit capacity.
    ///
    /// Order: parse, sign, precision, capacity.
    pub fn validate_against(
        &self,
        raw: &str,
        available: Quantity,
    ) -> Result<ValidQuantity, ValidationError> {
        self.check(Quantity::parse(raw)?, available)
    }

    /// Check an already numeric quantity: sign, precision, capacity.
    pub fn check(&self, quantity: Quantity, available: Quantity) -> Result<ValidQuantity, ValidationError> {
        if !quantity.is_positive() {
            return Err(ValidationError::NonPositive { quantity });
        }

        if quantity.fraction_digits() > self.max_fraction_digits {
            return Err(ValidationError::TooPrecise {
                quantity,
                max_fraction_digits: self.max_fraction_digits,
            });
        }

        if quantity > available {
            return Err(ValidationError::ExceedsRemaining {
                requested: quantity,
                remaining: available,
            });
        }

        Ok(ValidQuantity(quantity))
    }

    /// Validate several rows of one "add selected items" action.
    ///
    /// Every row is checked against the ledger as it stands before the batch,
    /// independently of the other rows. Returns the accepted proposals and the
    /// per-row failures, both in input order.
    pub fn validate_rows<'a>(
        &self,
        ledger: &Ledger,
        rows: impl IntoIterator<Item = (SourceLineId, &'a str)>,
    ) -> DomainResult<(Vec<Proposal>, Vec<(SourceLineId, ValidationError)>)> {
        let mut accepted = Vec::new();
        let mut row_errors = Vec::new();

        for (source_line_id, raw) in rows {
            match self.validate(ledger, source_line_id, raw) {
                Ok(q) => accepted.push(Proposal::new(source_line_id, q)),
                Err(DomainError::Validation(e)) => row_errors.push((source_line_id, e)),
                Err(other) => return Err(other),
            }
        }

        Ok((accepted, row_errors))
    }
}
