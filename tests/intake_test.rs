//! Integration tests for the intake state machine, run against the
//! in-memory store and queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use event_intake::config::IntakeSettings;
use event_intake::identity::IdentitySource;
use event_intake::intake::{FailureState, IntakeService};
use event_intake::ledger::HistoryPolicy;
use event_intake::model::request::IntakeRequest;
use event_intake::model::{EventId, Stage, Status};
use event_intake::queue::memory::MemoryQueue;
use event_intake::store::RecordStore;
use event_intake::store::memory::MemoryRecordStore;
use serde_json::Value;

struct Harness {
    store: Arc<MemoryRecordStore>,
    queue: Arc<MemoryQueue>,
    service: IntakeService,
}

fn harness_with(settings: IntakeSettings) -> Harness {
    let store = Arc::new(MemoryRecordStore::new());
    let queue = Arc::new(MemoryQueue::new(["events"]));
    let service = IntakeService::new(store.clone(), queue.clone(), settings);
    Harness {
        store,
        queue,
        service,
    }
}

fn harness() -> Harness {
    harness_with(IntakeSettings::new("events"))
}

fn example_request() -> IntakeRequest {
    IntakeRequest::new("/events", r#"{"a":1}"#).request_id("r-1")
}

fn body_json(body: &str) -> Value {
    serde_json::from_str(body).expect("response body is JSON")
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn example_request_succeeds_with_correlation_id_as_record_id() {
    let h = harness();

    let response = h.service.handle(&example_request()).await;

    assert_eq!(response.status_code, 200);
    assert!(!response.is_base64_encoded);
    assert_eq!(
        response.headers.get("Content-Type").map(String::as_str),
        Some("application/json")
    );
    let body = body_json(&response.body);
    assert_eq!(body["dynamodb_record_id"], "r-1");
    assert!(!body["sqs_response"].is_null());
    assert_eq!(body["sqs_response"]["dedup_key"], "r-1");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn successful_intake_leaves_pending_then_processed_trail() {
    let h = harness();

    let done = h.service.process(&example_request()).await.unwrap();
    assert!(done.status_updated);
    assert_eq!(done.identity, IdentitySource::Correlation);

    assert_eq!(h.store.len(), 1);
    let record = h
        .store
        .get_record(&EventId::new("r-1"))
        .await
        .unwrap()
        .expect("record stored");
    assert_eq!(record.retries, 0);
    assert_eq!(record.api_request, r#"{"a":1}"#);
    assert_eq!(record.status_history.len(), 2);
    assert_eq!(record.status_history[0].status, Status::Pending);
    assert_eq!(record.status_history[0].stage, Stage::Initial);
    assert_eq!(record.status_history[1].status, Status::Init);
    assert_eq!(record.status_history[1].stage, Stage::Processed);
}

#[tokio::test]
async fn replace_policy_keeps_only_latest_entry() {
    let h = harness_with(IntakeSettings::new("events").history_policy(HistoryPolicy::Replace));

    h.service.process(&example_request()).await.unwrap();

    let record = h
        .store
        .get_record(&EventId::new("r-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status_history.len(), 1);
    assert_eq!(record.status_history[0].status, Status::Init);
}

#[tokio::test]
async fn published_message_carries_event_id_and_original_request() {
    let h = harness();

    h.service.process(&example_request()).await.unwrap();

    let published = h.queue.published();
    assert_eq!(published.len(), 1);
    let message = &published[0].message;
    assert_eq!(message.dedup_key, "r-1");
    assert_eq!(message.ordering_key, "default");
    assert_eq!(message.payload["eventId"], "r-1");
    assert_eq!(message.payload["originalRequest"]["path"], "/events");
    assert_eq!(message.payload["originalRequest"]["body"], r#"{"a":1}"#);
}

#[tokio::test]
async fn fixed_ordering_key_sequences_all_messages() {
    let h = harness_with(IntakeSettings::new("events").ordering_key("intake"));

    for id in ["a", "b", "c"] {
        let request = IntakeRequest::new("/events", "{}").request_id(id);
        h.service.process(&request).await.unwrap();
    }

    let sequences: Vec<i64> = h
        .queue
        .published()
        .iter()
        .map(|m| {
            assert_eq!(m.receipt.ordering_key, "intake");
            m.receipt.sequence_number
        })
        .collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Identity / dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn redelivery_with_same_correlation_id_dedups() {
    let h = harness();

    let first = h.service.process(&example_request()).await.unwrap();
    let second = h.service.process(&example_request()).await.unwrap();

    assert_eq!(first.event_id, second.event_id);
    assert_eq!(first.receipt.dedup_key, second.receipt.dedup_key);
    assert!(!first.receipt.duplicate);
    assert!(second.receipt.duplicate);
    assert_eq!(second.receipt.message_id, first.receipt.message_id);
    assert_eq!(h.store.len(), 1);
    assert_eq!(h.queue.published().len(), 1);
}

#[tokio::test]
async fn missing_correlation_id_synthesizes_fresh_identity() {
    let h = harness();
    let request = IntakeRequest::new("/events", r#"{"a":1}"#);

    let first = h.service.process(&request).await.unwrap();
    let second = h.service.process(&request).await.unwrap();

    assert_eq!(first.identity, IdentitySource::Synthesized);
    assert!(uuid::Uuid::parse_str(first.event_id.as_str()).is_ok());
    assert_ne!(first.event_id, second.event_id);
    assert_eq!(h.store.len(), 2);
    assert_eq!(h.queue.published().len(), 2);
}

// ---------------------------------------------------------------------------
// Failure exits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_unavailable_never_reaches_queue() {
    let h = harness();
    h.store.fail_unavailable();

    let failure = h.service.process(&example_request()).await.unwrap_err();
    assert_eq!(failure.state, FailureState::StoreInitFailed);
    assert_eq!(failure.event_id, Some(EventId::new("r-1")));

    let response = h.service.handle(&example_request()).await;
    assert_eq!(response.status_code, 500);
    let body = body_json(&response.body);
    assert_eq!(body["path"], "/events");
    assert_eq!(body["description"], "System Events Unavailable");
    assert_eq!(body["errors"][0]["code"], "500");
    assert_eq!(body["errors"][0]["message"], "System Events Unavailable");
    assert!(body["timestamp"].is_string());

    assert_eq!(h.queue.resolve_calls(), 0);
    assert!(h.queue.published().is_empty());
}

#[tokio::test]
async fn rejected_write_never_reaches_queue() {
    let h = harness();
    h.store.fail_next_create();

    let failure = h.service.process(&example_request()).await.unwrap_err();

    assert_eq!(failure.state, FailureState::RecordWriteFailed);
    assert!(h.store.is_empty());
    assert_eq!(h.queue.resolve_calls(), 0);
}

#[tokio::test]
async fn publish_failure_leaves_record_pending() {
    let h = harness();
    h.queue.fail_publish();

    let response = h.service.handle(&example_request()).await;
    assert_eq!(response.status_code, 500);
    let body = body_json(&response.body);
    assert!(body["error"].as_str().unwrap().contains("publish failed"));

    let record = h
        .store
        .get_record(&EventId::new("r-1"))
        .await
        .unwrap()
        .expect("record survives publish failure");
    assert_eq!(record.status_history.len(), 1);
    assert_eq!(record.status_history[0].status, Status::Pending);
    assert_eq!(record.status_history[0].stage, Stage::Initial);
}

#[tokio::test]
async fn unknown_queue_is_a_publish_failure() {
    let h = harness_with(IntakeSettings::new("missing"));

    let failure = h.service.process(&example_request()).await.unwrap_err();

    assert_eq!(failure.state, FailureState::PublishFailed);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn status_update_failure_is_still_success() {
    let h = harness();
    h.store.fail_updates();

    let response = h.service.handle(&example_request()).await;
    assert_eq!(response.status_code, 200);

    let done = h
        .service
        .process(&IntakeRequest::new("/events", "{}").request_id("r-2"))
        .await
        .unwrap();
    assert!(!done.status_updated);

    let record = h
        .store
        .get_record(&EventId::new("r-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status_history.len(), 1);
    assert_eq!(record.status_history[0].status, Status::Pending);
}

#[tokio::test]
async fn malformed_body_is_a_500_with_parse_description() {
    let h = harness();
    let request = IntakeRequest::new("/events", "{not json").request_id("r-1");

    let response = h.service.handle(&request).await;

    assert_eq!(response.status_code, 500);
    let body = body_json(&response.body);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("not valid JSON"), "got {error}");
    assert!(h.store.is_empty());
    assert_eq!(h.queue.resolve_calls(), 0);
}

#[tokio::test]
async fn missing_body_is_a_500() {
    let h = harness();
    let request = IntakeRequest {
        path: "/events".to_string(),
        ..Default::default()
    };

    let failure = h.service.process(&request).await.unwrap_err();
    assert_eq!(failure.state, FailureState::Unexpected);

    let response = h.service.handle(&request).await;
    assert_eq!(response.status_code, 500);
    assert!(
        body_json(&response.body)["error"]
            .as_str()
            .unwrap()
            .contains("body is required")
    );
}

// ---------------------------------------------------------------------------
// Reconciliation hook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_pending_lists_records_never_confirmed() {
    let h = harness_with(IntakeSettings::new("events").pending_threshold(Duration::from_secs(60)));

    h.service
        .process(&IntakeRequest::new("/events", "{}").request_id("ok"))
        .await
        .unwrap();
    h.queue.fail_publish();
    h.service
        .process(&IntakeRequest::new("/events", "{}").request_id("stuck"))
        .await
        .unwrap_err();

    let now = Utc::now();
    assert!(h.service.stale_pending(now, 10).await.unwrap().is_empty());

    let later = now + chrono::Duration::minutes(5);
    let stale = h.service.stale_pending(later, 10).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].event_id, EventId::new("stuck"));
}

#[tokio::test]
async fn stale_pending_with_oversized_threshold_is_a_config_error() {
    let h = harness_with(
        IntakeSettings::new("events").pending_threshold(Duration::from_secs(10_000_000_000_000)),
    );

    let err = h.service.stale_pending(Utc::now(), 10).await.unwrap_err();

    assert!(matches!(err, event_intake::error::Error::Config(_)));
}
