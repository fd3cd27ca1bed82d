//! `fulfil-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the `Quantity` value object and the error taxonomy shared by
//! the allocation engine.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ValidationError};
pub use id::{AllocationId, SessionId, SourceLineId};
pub use value_object::{Quantity, ValueObject};
