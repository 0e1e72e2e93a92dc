//! Inbound request and caller-facing response shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, PublishReceipt};

pub const UNAVAILABLE_DESCRIPTION: &str = "System Events Unavailable";
pub const SUCCESS_MESSAGE: &str = "Message sent to queue and event record created";

/// A request as delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeRequest {
    /// Used only for error reporting.
    pub path: String,
    /// Serialized JSON payload. Required.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
}

/// Transport-provided context. `request_id` is the correlation identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub request_id: Option<String>,
}

impl IntakeRequest {
    pub fn new(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: Some(body.into()),
            request_context: None,
        }
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_context = Some(RequestContext {
            request_id: Some(id.into()),
        });
        self
    }

    /// The correlation identifier, if the transport supplied a usable one.
    pub fn correlation_id(&self) -> Option<&str> {
        self.request_context
            .as_ref()
            .and_then(|ctx| ctx.request_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Response envelope handed back to the transport. `body` is serialized JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeResponse {
    pub is_base64_encoded: bool,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl IntakeResponse {
    fn json(status_code: u16, body: &impl Serialize) -> Self {
        // The bodies below only hold strings, numbers and JSON values.
        let body = serde_json::to_string(body).unwrap_or_else(|e| {
            format!(r#"{{"error":"failed to encode response: {e}"}}"#)
        });
        Self {
            is_base64_encoded: false,
            status_code,
            headers: BTreeMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]),
            body,
        }
    }

    pub fn success(event_id: &EventId, receipt: &PublishReceipt) -> Self {
        Self::json(
            200,
            &SuccessBody {
                message: SUCCESS_MESSAGE.to_string(),
                sqs_response: receipt.clone(),
                dynamodb_record_id: event_id.clone(),
            },
        )
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self::json(
            500,
            &ErrorBody {
                error: description.into(),
            },
        )
    }

    pub fn unavailable(path: &str, now: DateTime<Utc>) -> Self {
        Self::json(
            500,
            &UnavailableBody {
                timestamp: now,
                path: path.to_string(),
                description: UNAVAILABLE_DESCRIPTION.to_string(),
                errors: vec![ErrorDetail {
                    code: "500".to_string(),
                    message: UNAVAILABLE_DESCRIPTION.to_string(),
                }],
            },
        )
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessBody {
    pub message: String,
    pub sqs_response: PublishReceipt,
    pub dynamodb_record_id: EventId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableBody {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub description: String,
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
