//! Metric instrument factories for event-intake.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"event-intake"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for event-intake instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("event-intake")
}

/// Counter: intake invocations by terminal state.
/// Labels: `outcome` ("status_updated" | "store_init_failed" |
/// "record_write_failed" | "publish_failed" | "unexpected").
pub fn intake_requests() -> Counter<u64> {
    meter()
        .u64_counter("intake.requests")
        .with_description("Number of intake invocations")
        .build()
}

/// Counter: record store writes.
/// Labels: `operation` ("create" | "update_status"), `result` ("ok" | "error").
pub fn record_writes() -> Counter<u64> {
    meter()
        .u64_counter("intake.record.writes")
        .with_description("Number of event record writes")
        .build()
}

/// Counter: queue-level operations (resolve, send, send_duplicate, create, read).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("intake.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: post-publish status advances.
/// Labels: `result` ("ok" | "error").
pub fn status_updates() -> Counter<u64> {
    meter()
        .u64_counter("intake.status.updates")
        .with_description("Number of post-publish status updates")
        .build()
}

/// Histogram: end-to-end intake duration in milliseconds.
/// Labels: `outcome`.
pub fn intake_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("intake.duration_ms")
        .with_description("Intake duration in milliseconds")
        .with_unit("ms")
        .build()
}
