//! Core data model.
//!
//! An event record is one intake request made durable: its identity, the
//! payload it arrived with, and the trail of lifecycle states it has passed
//! through. Queue messages are the transient handoff to downstream workers.

pub mod request;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event Identity
// ---------------------------------------------------------------------------

/// Primary key of an event record, and the dedup key of its queue message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Event Record
// ---------------------------------------------------------------------------

/// The durable entity representing one intake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_id: EventId,

    /// Set once at first write.
    pub creation_date: DateTime<Utc>,

    /// The original inbound payload, re-serialized. Opaque to intake.
    pub api_request: String,

    /// Reserved for downstream retry accounting. Intake writes 0 and never
    /// touches it again.
    pub retries: i32,

    /// Lifecycle trail. Never empty once the record exists.
    pub status_history: Vec<StatusEntry>,
}

impl EventRecord {
    /// The most recent entry of the trail.
    pub fn current(&self) -> Option<&StatusEntry> {
        self.status_history.last()
    }
}

/// One transition in a record's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub creation_date: DateTime<Utc>,
    pub status: Status,
    pub stage: Stage,
}

// ---------------------------------------------------------------------------
// Status / Stage
// ---------------------------------------------------------------------------

/// Record status. Downstream systems may write states intake never does,
/// so unknown values are kept verbatim rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    /// Durably recorded; publish not yet confirmed.
    Pending,
    /// Published and confirmed by intake.
    Init,
    Other(String),
}

/// Record stage, paired with [`Status`] in each history entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stage {
    Initial,
    Processed,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Pending => "PENDING",
            Status::Init => "INIT",
            Status::Other(s) => s,
        }
    }
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Initial => "INITIAL",
            Stage::Processed => "PROCESSED",
            Stage::Other(s) => s,
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => Status::Pending,
            "INIT" => Status::Init,
            _ => Status::Other(s),
        }
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        s.as_str().to_string()
    }
}

impl From<String> for Stage {
    fn from(s: String) -> Self {
        match s.as_str() {
            "INITIAL" => Stage::Initial,
            "PROCESSED" => Stage::Processed,
            _ => Stage::Other(s),
        }
    }
}

impl From<Stage> for String {
    fn from(s: Stage) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Queue Message
// ---------------------------------------------------------------------------

/// Body of the message handed to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePayload {
    pub event_id: EventId,
    pub original_request: serde_json::Value,
}

/// A message ready to publish. Not owned by intake once sent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Always the event id, so broker dedup lines up with record identity.
    pub dedup_key: String,
    /// Messages sharing this key keep their relative order at the broker.
    pub ordering_key: String,
    pub payload: serde_json::Value,
}

impl OutboundMessage {
    pub fn for_event(
        payload: &QueuePayload,
        ordering_key: impl Into<String>,
    ) -> crate::error::Result<Self> {
        Ok(Self {
            dedup_key: payload.event_id.0.clone(),
            ordering_key: ordering_key.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Resolved location of a named queue channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAddress {
    pub name: String,
    pub url: String,
}

/// What the broker reported back for a publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub message_id: i64,
    /// Position within the ordering key, starting at 1.
    pub sequence_number: i64,
    pub dedup_key: String,
    pub ordering_key: String,
    /// True when the dedup window absorbed this send.
    pub duplicate: bool,
}
