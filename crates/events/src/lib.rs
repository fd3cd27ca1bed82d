//! Domain events, envelopes and read-model projections.

pub mod envelope;
pub mod event;
pub mod projection;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use projection::Projection;
