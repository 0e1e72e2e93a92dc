//! Intake span helpers.
//!
//! One span per invocation. The event id and stage are unknown when the
//! span opens, so both fields start empty and are filled as intake moves.

use tracing::Span;

/// Start a span for one intake invocation.
pub fn start_intake_span(path: &str) -> Span {
    tracing::info_span!(
        "intake.handle",
        "intake.path" = path,
        "intake.event_id" = tracing::field::Empty,
        "intake.identity" = tracing::field::Empty,
        "intake.stage" = tracing::field::Empty,
    )
}

/// Record the resolved event id and where it came from.
pub fn record_event_id(span: &Span, event_id: &str, source: &str) {
    span.record("intake.event_id", event_id);
    span.record("intake.identity", source);
}

/// Record a stage transition on the span and emit an event for it.
pub fn record_stage_transition(span: &Span, from: &str, to: &str) {
    span.record("intake.stage", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "stage_transition");
    });
}
