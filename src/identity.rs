//! Event identity resolution.
//!
//! A transport correlation id makes retries of the same physical call land
//! on the same record and the same dedup key. Without one a fresh UUID is
//! minted, and that request cannot be deduplicated: every redelivery gets a
//! new identity. Callers that care about dedup must send a stable id.

use uuid::Uuid;

use crate::model::EventId;
use crate::model::request::IntakeRequest;

/// Where an event id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Taken from the transport's correlation id. Stable across retries.
    Correlation,
    /// Minted for this invocation only.
    Synthesized,
}

impl IdentitySource {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentitySource::Correlation => "correlation",
            IdentitySource::Synthesized => "synthesized",
        }
    }
}

/// Resolve the event id for a request. Never fails.
pub fn resolve(request: &IntakeRequest) -> (EventId, IdentitySource) {
    match request.correlation_id() {
        Some(id) => (EventId::new(id), IdentitySource::Correlation),
        None => (
            EventId::new(Uuid::new_v4().to_string()),
            IdentitySource::Synthesized,
        ),
    }
}
