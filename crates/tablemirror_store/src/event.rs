//! Webhook audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbound webhook delivery, stored for audit and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Local insertion identity.
    pub id: i64,
    /// Delivery key derived from the timestamp header and body digest.
    pub event_id: String,
    /// Upstream base identifier, or [`NewChangeEvent::UNKNOWN_SOURCE`].
    pub source_identifier: String,
    /// The decoded notification body.
    pub raw_payload: serde_json::Value,
    /// Time of ingestion.
    pub received_at: DateTime<Utc>,
    /// Inert audit flag. Always `false` when written.
    pub processed: bool,
}

/// A change event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChangeEvent {
    /// Delivery key.
    pub event_id: String,
    /// Upstream base identifier.
    pub source_identifier: String,
    /// The decoded notification body.
    pub raw_payload: serde_json::Value,
}

impl NewChangeEvent {
    /// Source identifier used when the payload names no base.
    pub const UNKNOWN_SOURCE: &'static str = "unknown";

    /// Creates a new change event.
    pub fn new(
        event_id: impl Into<String>,
        source_identifier: impl Into<String>,
        raw_payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            source_identifier: source_identifier.into(),
            raw_payload,
        }
    }

    pub(crate) fn materialize(self, id: i64, received_at: DateTime<Utc>) -> ChangeEvent {
        ChangeEvent {
            id,
            event_id: self.event_id,
            source_identifier: self.source_identifier,
            raw_payload: self.raw_payload,
            received_at,
            processed: false,
        }
    }
}

/// Outcome of appending a change event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventInsert {
    /// The event was appended.
    Inserted(ChangeEvent),
    /// An event with the same `event_id` already exists; nothing was written.
    Duplicate,
}

impl EventInsert {
    /// Returns true if the delivery was seen before.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EventInsert::Duplicate)
    }
}
