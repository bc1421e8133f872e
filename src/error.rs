//! # Error Handling
//!
//! Unified error responses for the HTTP surface. Every failure renders as a
//! JSON object whose `error` key names the failure kind, followed by any
//! context fields and the request trace ID.

use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::graph::{GraphBody, GraphResponse};
use crate::telemetry;

/// Unified API error response
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code for the response
    pub status: StatusCode,
    /// Error kind for programmatic handling (`missing_code`, `invalid_state`, ...)
    pub error: Box<str>,
    /// Additional top-level fields rendered next to `error`
    pub context: Map<String, Value>,
    /// Correlation trace ID for debugging
    pub trace_id: Option<Box<str>>,
}

/// Documented shape of [`ApiError`] bodies.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error kind
    #[schema(example = "invalid_state")]
    pub error: String,
    /// Upstream or validation details, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<Value>,
    /// Correlation ID echoed in the `x-request-id` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ApiError {
    /// Create a new API error with the given status code and kind
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into().into_boxed_str(),
            context: Map::new(),
            trace_id: telemetry::current_trace_id().map(String::into_boxed_str),
        }
    }

    /// Add a top-level context field
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Add a `details` field
    pub fn with_details(self, details: impl Into<Value>) -> Self {
        self.with_context("details", details)
    }

    /// Shortcut for the `details` field, if set
    pub fn details(&self) -> Option<&Value> {
        self.context.get("details")
    }
}

impl Serialize for ApiError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("error", &self.error)?;
        for (key, value) in &self.context {
            // `error` and `trace_id` are reserved for the envelope.
            if key != "error" && key != "trace_id" {
                map.serialize_entry(key, value)?;
            }
        }
        if let Some(trace_id) = &self.trace_id {
            map.serialize_entry("trace_id", trace_id)?;
        }
        map.end()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error, self.status)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self)).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, "invalid_query")
            .with_context("message", rejection.body_text())
    }
}

/// Forward an upstream Graph API failure.
///
/// A JSON upstream body is carried verbatim under `details` with the upstream
/// status; anything else becomes a 500 with the raw text.
pub fn upstream_error(kind: &str, upstream: &GraphResponse) -> ApiError {
    match &upstream.body {
        GraphBody::Json(body) => {
            let status =
                StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            // A 2xx that still failed (e.g. no access_token) must not look like success.
            let status = if status.is_success() {
                StatusCode::BAD_GATEWAY
            } else {
                status
            };
            ApiError::new(status, kind)
                .with_context("upstream_status", upstream.status)
                .with_details(body.clone())
        }
        GraphBody::Text(text) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, kind)
            .with_context("upstream_status", upstream.status)
            .with_details(text.clone()),
    }
}

/// Upstream call that never produced a response (timeout, DNS, TLS).
pub fn transport_error(kind: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, kind).with_details(message.into())
}

/// 403 for a failed webhook subscription handshake
pub fn forbidden() -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden")
}

/// 400 for request bodies that do not parse
pub fn invalid_payload(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "invalid_payload").with_details(message.into())
}

pub fn internal_error() -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
}
