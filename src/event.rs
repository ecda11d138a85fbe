//! Immutable, sequence-numbered events.

use chrono::{DateTime, Utc};

use crate::document::{Document, DocumentError};
use crate::storage::EventRecord;

/// Event type recorded when the publisher does not supply one.
pub const DEFAULT_EVENT_TYPE: &str = "event";

/// One document appended to a channel.
///
/// Created exactly once by the event sink at append time and shared between
/// subscribers as `Arc<Event>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    channel: String,
    sequence: u64,
    event_type: String,
    timestamp: DateTime<Utc>,
    document: Document,
    size_bytes: usize,
}

impl Event {
    pub(crate) fn new(channel: &str, record: &EventRecord, document: Document) -> Self {
        Self {
            channel: channel.to_string(),
            sequence: record.sequence,
            event_type: record.event_type.clone(),
            timestamp: record.created_at,
            document,
            size_bytes: record.data.len(),
        }
    }

    /// Rebuild an event from its persisted form.
    pub fn from_record(channel: &str, record: &EventRecord) -> Result<Self, DocumentError> {
        let document = record.document()?;
        Ok(Self::new(channel, record, document))
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Encoded size of the payload, used for flow-control accounting.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}
