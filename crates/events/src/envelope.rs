use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fulfil_core::SessionId;

/// Envelope for an event, carrying session + stream metadata.
///
/// This is the unit appended to a session journal.
///
/// Notes:
/// - `session_id` scopes the event to one allocation session.
/// - **Append-only**: `sequence_number` increases by one per event in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    session_id: SessionId,

    /// Monotonically increasing position in the session stream (1-based).
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: Uuid, session_id: SessionId, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id,
            session_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
