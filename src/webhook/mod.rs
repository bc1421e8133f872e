//! # Webhook Protocol
//!
//! Meta's subscription handshake, the optional `X-Hub-Signature-256` payload
//! check, and walking a delivery's `entry[].messaging[]` events.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;
use utoipa::IntoParams;

use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

/// Query parameters of the subscription handshake
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Webhook errors
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("subscription verification failed")]
    Forbidden,

    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header")]
    InvalidSignatureFormat,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Forbidden => StatusCode::FORBIDDEN,
            WebhookError::MissingSignature
            | WebhookError::InvalidSignatureFormat
            | WebhookError::VerificationFailed => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::Forbidden => "forbidden",
            WebhookError::MissingSignature
            | WebhookError::InvalidSignatureFormat
            | WebhookError::VerificationFailed => "invalid_signature",
            WebhookError::InvalidPayload(_) => "invalid_payload",
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(error: WebhookError) -> Self {
        let api = ApiError::new(error.status_code(), error.kind());
        match error {
            WebhookError::InvalidPayload(e) => api.with_details(e.to_string()),
            WebhookError::Forbidden => api,
            other => api.with_details(other.to_string()),
        }
    }
}

/// Check the subscription handshake and hand back the challenge to echo.
///
/// Succeeds only for `hub.mode == "subscribe"` with the exact configured token.
pub fn verify_subscription<'q>(
    query: &'q VerifyQuery,
    expected_token: &str,
) -> Result<&'q str, WebhookError> {
    let mode_ok = query.mode.as_deref() == Some("subscribe");
    let token_ok = query
        .verify_token
        .as_deref()
        .map(|token| bool::from(token.as_bytes().ct_eq(expected_token.as_bytes())))
        .unwrap_or(false);

    if mode_ok && token_ok {
        Ok(query.challenge.as_deref().unwrap_or_default())
    } else {
        debug!(mode = ?query.mode, "Webhook subscription rejected");
        Err(WebhookError::Forbidden)
    }
}

/// Verify `X-Hub-Signature-256: sha256=<hex>` against HMAC-SHA256(app_secret, body).
pub fn verify_signature(
    body: &[u8],
    signature_header: Option<&str>,
    app_secret: &str,
) -> Result<(), WebhookError> {
    let header = signature_header
        .filter(|value| !value.is_empty())
        .ok_or(WebhookError::MissingSignature)?;
    let provided_hex = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::InvalidSignatureFormat)?;
    let provided = hex::decode(provided_hex).map_err(|_| WebhookError::InvalidSignatureFormat)?;

    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|_| WebhookError::VerificationFailed)?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if bool::from(expected.as_slice().ct_eq(&provided[..])) {
        Ok(())
    } else {
        Err(WebhookError::VerificationFailed)
    }
}

/// Parse a raw delivery body.
pub fn parse_payload(body: &[u8]) -> Result<Value, WebhookError> {
    Ok(serde_json::from_slice(body)?)
}

/// Every `entry[].messaging[]` element in payload order. Missing arrays yield nothing.
pub fn messaging_events(payload: &Value) -> impl Iterator<Item = &Value> {
    payload
        .get("entry")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("messaging").and_then(Value::as_array))
        .flatten()
}
