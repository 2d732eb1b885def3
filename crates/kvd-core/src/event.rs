// ABOUTME: Defines the transaction log's event record and event type codes.
// ABOUTME: Events are immutable facts describing a single key mutation.

use serde::{Deserialize, Serialize};

/// The kind of mutation an event records.
///
/// Wire code 0 is reserved and never produced; decoding it (or any unknown
/// code) is a corruption signal, not a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Delete,
    Put,
}

impl EventType {
    /// The integer code used in persisted records: 1 = Delete, 2 = Put.
    pub fn code(self) -> u8 {
        match self {
            EventType::Delete => 1,
            EventType::Put => 2,
        }
    }

    /// Decode a persisted integer code. Returns None for the reserved
    /// code 0 and for anything unknown.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(EventType::Delete),
            2 => Some(EventType::Put),
            _ => None,
        }
    }
}

/// One durable record of a single key mutation, carrying its assigned
/// position in the log's total order.
///
/// Events exist only in transit: constructed by a write call, serialized
/// by a backend, and reconstructed during replay. They are never mutated
/// once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Strictly increasing, unique, assigned by the log — never the caller.
    pub sequence: u64,
    pub event_type: EventType,
    pub key: String,
    /// The stored value for a Put; empty for a Delete.
    pub value: String,
}

/// A mutation accepted for writing but not yet sequenced. The writer task
/// assigns the sequence number when it dequeues the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub event_type: EventType,
    pub key: String,
    pub value: String,
}

impl PendingEvent {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Attach the sequence number assigned by the writer task.
    pub fn into_event(self, sequence: u64) -> Event {
        Event {
            sequence,
            event_type: self.event_type,
            key: self.key,
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_codes_round_trip() {
        assert_eq!(EventType::from_code(EventType::Delete.code()), Some(EventType::Delete));
        assert_eq!(EventType::from_code(EventType::Put.code()), Some(EventType::Put));
    }

    #[test]
    fn event_type_code_zero_is_reserved() {
        assert_eq!(EventType::from_code(0), None);
    }

    #[test]
    fn event_type_unknown_codes_rejected() {
        assert_eq!(EventType::from_code(3), None);
        assert_eq!(EventType::from_code(255), None);
    }

    #[test]
    fn pending_put_carries_key_and_value() {
        let event = PendingEvent::put("color", "green").into_event(7);
        assert_eq!(event.sequence, 7);
        assert_eq!(event.event_type, EventType::Put);
        assert_eq!(event.key, "color");
        assert_eq!(event.value, "green");
    }

    #[test]
    fn pending_delete_has_empty_value() {
        let event = PendingEvent::delete("color").into_event(1);
        assert_eq!(event.event_type, EventType::Delete);
        assert_eq!(event.value, "");
    }

    #[test]
    fn event_serializes_round_trip() {
        let event = Event {
            sequence: 3,
            event_type: EventType::Put,
            key: "k".to_string(),
            value: "v".to_string(),
        };
        let json = serde_json::to_string(&event).expect("serialize event");
        let deser: Event = serde_json::from_str(&json).expect("deserialize event");
        assert_eq!(event, deser);
    }
}
