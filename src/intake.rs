//! Intake orchestrator.
//!
//! Turns one inbound request into a durable PENDING record and a
//! deduplicated queue message, then confirms the record. Steps run strictly
//! in order:
//!
//! ```text
//! START -> IDENTIFIED -> RECORD_WRITTEN -> PUBLISHED -> STATUS_UPDATED
//!                     \-> STORE_INIT_FAILED
//!                     \-> RECORD_WRITE_FAILED
//!                                       \-> PUBLISH_FAILED
//! ```
//!
//! The record is written before anything is published, so a message never
//! exists without its record. The reverse is accepted: if publish fails the
//! record stays PENDING and nothing is rolled back. A failed status update
//! after a successful publish is logged and otherwise ignored, so consumers
//! must read PENDING as "durably queued, not yet confirmed". Nothing is
//! retried here; retries belong to the caller.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::config::IntakeSettings;
use crate::error::{Error, Result};
use crate::identity::{self, IdentitySource};
use crate::ledger;
use crate::model::request::{IntakeRequest, IntakeResponse};
use crate::model::{EventId, EventRecord, OutboundMessage, PublishReceipt, QueuePayload, Status};
use crate::queue::QueueChannel;
use crate::store::RecordStore;
use crate::telemetry::intake::{record_event_id, record_stage_transition, start_intake_span};
use crate::telemetry::metrics;

/// Progress of one invocation through the success path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeState {
    Start,
    Identified,
    RecordWritten,
    Published,
    StatusUpdated,
}

/// Terminal failure exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureState {
    /// The store could not be reached. Nothing was written.
    StoreInitFailed,
    /// The store rejected the write. Nothing was published.
    RecordWriteFailed,
    /// The record is PENDING but the queue never accepted the message.
    PublishFailed,
    /// Anything else, including a malformed body.
    Unexpected,
}

impl IntakeState {
    pub fn as_str(self) -> &'static str {
        match self {
            IntakeState::Start => "start",
            IntakeState::Identified => "identified",
            IntakeState::RecordWritten => "record_written",
            IntakeState::Published => "published",
            IntakeState::StatusUpdated => "status_updated",
        }
    }
}

impl FailureState {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureState::StoreInitFailed => "store_init_failed",
            FailureState::RecordWriteFailed => "record_write_failed",
            FailureState::PublishFailed => "publish_failed",
            FailureState::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for FailureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A successful intake.
#[derive(Debug, Clone)]
pub struct IntakeReceipt {
    pub event_id: EventId,
    pub identity: IdentitySource,
    pub receipt: PublishReceipt,
    /// False when the post-publish status advance failed. The intake still
    /// succeeded.
    pub status_updated: bool,
}

/// A failed intake and the exit it took.
#[derive(Debug, thiserror::Error)]
#[error("{state}: {error}")]
pub struct IntakeFailure {
    pub state: FailureState,
    /// Known from IDENTIFIED onwards.
    pub event_id: Option<EventId>,
    pub error: Error,
}

impl IntakeFailure {
    fn new(state: FailureState, event_id: &EventId, error: Error) -> Self {
        Self {
            state,
            event_id: Some(event_id.clone()),
            error,
        }
    }
}

/// The intake orchestrator. Stateless between invocations; clones share the
/// same store, queue and settings.
#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn QueueChannel>,
    settings: IntakeSettings,
}

impl IntakeService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn QueueChannel>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            store,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> &IntakeSettings {
        &self.settings
    }

    /// Run intake and shape the caller-facing response.
    ///
    /// This is the outermost error boundary: every failure becomes a 500,
    /// never a propagated error.
    pub async fn handle(&self, request: &IntakeRequest) -> IntakeResponse {
        match self.process(request).await {
            Ok(done) => IntakeResponse::success(&done.event_id, &done.receipt),
            Err(failure) => match failure.state {
                FailureState::StoreInitFailed | FailureState::RecordWriteFailed => {
                    IntakeResponse::unavailable(&request.path, Utc::now())
                }
                FailureState::PublishFailed | FailureState::Unexpected => {
                    IntakeResponse::error(failure.error.to_string())
                }
            },
        }
    }

    /// Run the intake state machine for one request.
    pub async fn process(
        &self,
        request: &IntakeRequest,
    ) -> std::result::Result<IntakeReceipt, IntakeFailure> {
        let span = start_intake_span(&request.path);
        let started = Instant::now();

        let result = self.run(request, &span).instrument(span.clone()).await;

        let outcome = match &result {
            Ok(_) => IntakeState::StatusUpdated.as_str(),
            Err(failure) => failure.state.as_str(),
        };
        let labels = [KeyValue::new("outcome", outcome)];
        metrics::intake_requests().add(1, &labels);
        metrics::intake_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &labels);

        result
    }

    async fn run(
        &self,
        request: &IntakeRequest,
        span: &Span,
    ) -> std::result::Result<IntakeReceipt, IntakeFailure> {
        let mut state = IntakeState::Start;

        let (event_id, source) = identity::resolve(request);
        record_event_id(span, event_id.as_str(), source.as_str());
        if source == IdentitySource::Synthesized {
            warn!(
                event_id = %event_id,
                "request carries no correlation id, synthesized one; redeliveries will not deduplicate"
            );
        }
        advance_state(span, &mut state, IntakeState::Identified);

        let payload = parse_body(request)
            .map_err(|e| IntakeFailure::new(FailureState::Unexpected, &event_id, e))?;

        let record = new_record(&event_id, &payload, Utc::now())
            .map_err(|e| IntakeFailure::new(FailureState::Unexpected, &event_id, e))?;

        if let Err(e) = self.store.create_record(&record).await {
            let state = if e.is_store_unavailable() {
                FailureState::StoreInitFailed
            } else {
                FailureState::RecordWriteFailed
            };
            error!(event_id = %event_id, %state, error = %e, "event record not written");
            return Err(IntakeFailure::new(state, &event_id, e));
        }
        advance_state(span, &mut state, IntakeState::RecordWritten);

        let receipt = self.publish(request, &event_id).await.map_err(|e| {
            let state = match &e {
                Error::QueueNotFound(_) | Error::Publish(_) => FailureState::PublishFailed,
                _ => FailureState::Unexpected,
            };
            error!(
                event_id = %event_id,
                %state,
                error = %e,
                "message not queued, record left PENDING"
            );
            IntakeFailure::new(state, &event_id, e)
        })?;
        advance_state(span, &mut state, IntakeState::Published);

        let status_updated = match self.confirm(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    event_id = %event_id,
                    error = %e,
                    "status update failed after publish, record stays PENDING"
                );
                false
            }
        };
        metrics::status_updates().add(
            1,
            &[KeyValue::new(
                "result",
                if status_updated { "ok" } else { "error" },
            )],
        );
        advance_state(span, &mut state, IntakeState::StatusUpdated);

        info!(
            event_id = %event_id,
            message_id = receipt.message_id,
            duplicate = receipt.duplicate,
            "event accepted"
        );

        Ok(IntakeReceipt {
            event_id,
            identity: source,
            receipt,
            status_updated,
        })
    }

    async fn publish(&self, request: &IntakeRequest, event_id: &EventId) -> Result<PublishReceipt> {
        let payload = QueuePayload {
            event_id: event_id.clone(),
            original_request: serde_json::to_value(request)?,
        };
        let message = OutboundMessage::for_event(&payload, &self.settings.ordering_key)?;
        let address = self.queue.resolve_address(&self.settings.queue_name).await?;
        debug!(queue = %address.url, "queue address resolved");
        self.queue.publish(&address, &message).await
    }

    async fn confirm(&self, record: &EventRecord) -> Result<()> {
        let history = ledger::mark_processed(
            &record.status_history,
            Utc::now(),
            self.settings.history_policy,
        )?;
        self.store.update_status(&record.event_id, &history).await
    }

    /// PENDING records older than the pending threshold: possibly never
    /// queued, and candidates for an external reconciler to replay.
    pub async fn stale_pending(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<EventRecord>> {
        let threshold = chrono::Duration::from_std(self.settings.pending_threshold)
            .map_err(|e| Error::Config(format!("pending threshold out of range: {e}")))?;
        let cutoff = now
            .checked_sub_signed(threshold)
            .ok_or_else(|| Error::Config("pending threshold is out of range".into()))?;
        self.store
            .list_by_status(&Status::Pending, cutoff, limit)
            .await
    }
}

fn advance_state(span: &Span, state: &mut IntakeState, next: IntakeState) {
    record_stage_transition(span, state.as_str(), next.as_str());
    *state = next;
}

fn parse_body(request: &IntakeRequest) -> Result<serde_json::Value> {
    let body = request
        .body
        .as_deref()
        .ok_or_else(|| Error::MalformedInput("request body is required".to_string()))?;
    serde_json::from_str(body)
        .map_err(|e| Error::MalformedInput(format!("request body is not valid JSON: {e}")))
}

fn new_record(
    event_id: &EventId,
    payload: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<EventRecord> {
    Ok(EventRecord {
        event_id: event_id.clone(),
        creation_date: now,
        api_request: serde_json::to_string(payload)?,
        retries: 0,
        status_history: vec![ledger::initial_entry(now)],
    })
}
