//! HTTP transport adapter.
//!
//! Any `POST`, including `POST /` and `POST /health`, becomes one intake:
//! the URI path is the request path, the body is passed through untouched, and the correlation id comes from
//! `x-request-id` (or `x-correlation-id`). The intake response's status,
//! headers and body are returned as-is.

use std::any::Any;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::intake::IntakeService;
use crate::model::request::{IntakeRequest, IntakeResponse, RequestContext};

const CORRELATION_HEADERS: [&str; 2] = ["x-request-id", "x-correlation-id"];

pub fn router(service: IntakeService) -> Router {
    Router::new()
        .route("/", post(intake))
        .route("/health", get(health).post(intake))
        .route("/{*path}", post(intake))
        .with_state(service)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(service: IntakeService, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "intake listening");
    axum::serve(listener, router(service)).await
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn intake(
    State(service): State<IntakeService>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = to_intake_request(&uri, &headers, &body);
    let response = service.handle(&request).await;
    to_http_response(response)
}

/// Build an intake request from the pieces of an HTTP request.
pub fn to_intake_request(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> IntakeRequest {
    let request_id = CORRELATION_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
    });

    IntakeRequest {
        path: uri.path().to_string(),
        // Non-UTF-8 bodies are passed on lossily; they fail JSON parsing anyway.
        body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
        request_context: Some(RequestContext { request_id }),
    }
}

pub fn to_http_response(response: IntakeResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut http = (status, Body::from(response.body)).into_response();
    for (name, value) in response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(&value),
        ) {
            http.headers_mut().insert(name, value);
        }
    }
    http
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let description = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unexpected internal error".to_string()
    };
    tracing::error!(%description, "intake handler panicked");
    to_http_response(IntakeResponse::error(description))
}
