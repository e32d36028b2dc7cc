//! Event and snapshot record types.
//!
//! [`NewEvent`] is what a caller hands to the store for appending.
//! [`RecordedEvent`] is what the store hands back: the same data plus the
//! store-assigned global position, stream version, and commit timestamp.
//! [`Snapshot`] is a serialized aggregate state at a specific stream
//! version, used by callers to bound event-replay cost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, StreamId};

/// A proposed event, not yet persisted.
///
/// Payload and metadata are opaque encoded bytes. The store writes them
/// verbatim and never inspects them; encoding is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// String tag identifying the event's shape (for example `"Deposited"`).
    pub event_type: String,
    /// Opaque encoded event body.
    pub payload: Vec<u8>,
    /// Optional opaque encoded context (actor, origin, ...).
    pub metadata: Option<Vec<u8>>,
    /// Identifier linking this event to a wider logical operation.
    ///
    /// When `None`, the store assigns one fresh identifier per append batch.
    pub correlation_id: Option<CorrelationId>,
}

impl NewEvent {
    /// Create a proposed event with no metadata and no correlation id.
    pub fn new(event_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: None,
            correlation_id: None,
        }
    }

    /// Attach opaque metadata bytes.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Vec<u8>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attach a correlation identifier.
    #[must_use]
    pub const fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// An immutable, persisted event.
///
/// Created only by an append; never updated or deleted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Store-assigned position, strictly increasing across all streams.
    pub global_id: i64,
    /// The stream this event belongs to.
    pub stream_id: StreamId,
    /// String tag identifying the event's shape.
    pub event_type: String,
    /// Opaque encoded event body.
    pub payload: Vec<u8>,
    /// Optional opaque encoded context.
    pub metadata: Option<Vec<u8>>,
    /// 1-based, gapless position of this event within its stream.
    pub version: u64,
    /// When the event was committed.
    pub timestamp: DateTime<Utc>,
    /// Identifier linking events of one logical operation across streams.
    pub correlation_id: CorrelationId,
}

/// A point-in-time serialized aggregate state.
///
/// `version` is the last event version folded into `state_data`. The store
/// does not validate that the state is causally consistent with the
/// stream's history; that is the caller's obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The stream this snapshot belongs to.
    pub stream_id: StreamId,
    /// Last event version folded into this state.
    pub version: u64,
    /// Opaque encoded aggregate state.
    pub state_data: Vec<u8>,
    /// When the snapshot was saved.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn new_event_builder_sets_optional_fields() {
        let correlation = CorrelationId::new();
        let event = NewEvent::new("Opened", vec![1, 2, 3])
            .with_metadata(vec![9])
            .with_correlation(correlation);

        assert_eq!(event.event_type, "Opened");
        assert_eq!(event.payload, vec![1, 2, 3]);
        assert_eq!(event.metadata, Some(vec![9]));
        assert_eq!(event.correlation_id, Some(correlation));
    }

    #[test]
    fn new_event_defaults_leave_optionals_empty() {
        let event = NewEvent::new("Opened", Vec::new());
        assert!(event.metadata.is_none());
        assert!(event.correlation_id.is_none());
    }

    #[test]
    fn recorded_event_roundtrips_through_serde() {
        let event = RecordedEvent {
            global_id: 7,
            stream_id: StreamId::new("account-1"),
            event_type: "Opened".to_owned(),
            payload: vec![1, 2],
            metadata: None,
            version: 1,
            timestamp: Utc::now(),
            correlation_id: CorrelationId::new(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let back: RecordedEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, back);
    }
}
