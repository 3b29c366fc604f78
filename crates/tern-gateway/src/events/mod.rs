//! Decoded gateway events

mod event_types;

pub use event_types::EventType;

use serde_json::Value;

/// A decoded gateway event
///
/// Immutable once produced; ownership moves from the connection to the
/// dispatcher to the listener.
#[derive(Debug, Clone)]
pub struct Event {
    /// Tagged event type
    pub event_type: EventType,

    /// Sequence number assigned by the server
    pub sequence: u64,

    /// Decoded payload, opaque to the transport
    pub data: Value,
}

impl Event {
    /// Create an event from its decoded parts
    #[must_use]
    pub fn new(event_type: EventType, sequence: u64, data: Value) -> Self {
        Self {
            event_type,
            sequence,
            data,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (s={})", self.event_type, self.sequence)
    }
}
