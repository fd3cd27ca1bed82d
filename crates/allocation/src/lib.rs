//! Partial-fulfillment quantity allocator.
//!
//! Tracks how much of each finite-quantity source line (a purchase-order item)
//! has been committed to destination groupings (shipments, packages) across
//! repeated, undoable user actions, and guarantees that the committed total of
//! a line never exceeds its quantity.
//!
//! Pure, single-session, in-memory domain logic: no IO, no HTTP, no storage.

pub mod allocation;
pub mod config;
pub mod ledger;
pub mod selection;
pub mod session;
pub mod source;
pub mod validator;

pub use allocation::{
    Allocation, AllocationCommand, AllocationEvent, AllocationRemoved, AllocationSet,
    BatchCommitted, CommitBatch, Proposal, RejectedProposal, RemoveAllocation,
};
pub use config::AllocatorConfig;
pub use ledger::Ledger;
pub use selection::{SelectionCoordinator, SelectionState};
pub use session::{BatchOutcome, LineSummary, Session, SubmissionLine};
pub use source::{SourceCatalog, SourceLine};
pub use validator::{ValidQuantity, Validator};
