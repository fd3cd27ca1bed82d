use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: they can be dropped and rebuilt by
/// replaying events at any time. Events are the source of truth.
///
/// Projections must be **idempotent** with respect to redelivery: applying an
/// envelope whose sequence number was already seen is a no-op.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// Events that are not relevant to this projection are ignored. Events
    /// that cannot be applied without breaking the read model's invariants
    /// indicate a bug upstream and may panic.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
