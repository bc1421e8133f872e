//! # Webhook Handlers
//!
//! Meta's subscription handshake, event ingestion and the activity log views.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::models::{AutoReplyRecord, WebhookEvent};
use crate::server::AppState;
use crate::store::activity_log::{DEFAULT_LOG_LIMIT, MAX_LOG_LIMIT};
use crate::webhook::{self, SIGNATURE_HEADER, VerifyQuery, WebhookError};

/// Acknowledgement returned for every accepted delivery
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    /// Always `received`
    pub status: String,
}

/// Log view query
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    /// Entries per log (default 50, max 500)
    pub limit: Option<usize>,
}

/// Most recent entries of both activity logs, oldest first
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookLogsResponse {
    pub webhook_events: Vec<WebhookEvent>,
    pub auto_replies: Vec<AutoReplyRecord>,
}

/// Webhook configuration summary; never includes secret values
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookStatusResponse {
    /// False while the built-in default verify token is in use
    pub verify_token_configured: bool,
    pub page_token_configured: bool,
    pub signature_required: bool,
    pub webhook_path: String,
    pub oauth_configured: bool,
    pub graph_api_base: String,
}

/// Subscription handshake
///
/// Echoes `hub.challenge` when `hub.mode` is `subscribe` and `hub.verify_token`
/// matches the configured token.
#[utoipa::path(
    get,
    path = "/webhook",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Challenge echoed", body = String, content_type = "text/plain"),
        (status = 403, description = "Verification failed", body = crate::error::ErrorResponse)
    ),
    tag = "webhook"
)]
pub async fn verify_webhook(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, ApiError> {
    let challenge = webhook::verify_subscription(&query, &state.config.webhook_verify_token)?;
    info!("Webhook subscription verified");
    Ok(challenge.to_string())
}

/// Receive a delivery
///
/// The payload is logged as received, then every message event is answered
/// with the auto-reply. The acknowledgement does not depend on reply outcomes.
#[utoipa::path(
    post,
    path = "/webhook",
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 400, description = "Body is not valid JSON", body = crate::error::ErrorResponse),
        (status = 401, description = "Signature missing or invalid", body = crate::error::ErrorResponse)
    ),
    tag = "webhook"
)]
pub async fn ingest_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if state.config.webhook_require_signature {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        let secret = state
            .config
            .client_secret
            .as_deref()
            .ok_or(WebhookError::VerificationFailed)?;
        webhook::verify_signature(&body, signature, secret).inspect_err(|e| {
            warn!(error = %e, "Rejected webhook delivery");
        })?;
    }

    let payload = webhook::parse_payload(&body)?;
    debug!(bytes = body.len(), "Webhook delivery received");

    if let Err(e) = state
        .activity_log
        .append_webhook_event(&WebhookEvent::received(payload.clone()))
        .await
    {
        warn!(error = %e, "Failed to append webhook event");
    }

    let mut replies = 0usize;
    for event in webhook::messaging_events(&payload) {
        if state.replies.dispatch(event).await.is_some() {
            replies += 1;
        }
    }
    info!(replies, "Webhook delivery processed");

    Ok(Json(WebhookAck {
        status: "received".to_string(),
    }))
}

/// Recent webhook deliveries and auto-replies
#[utoipa::path(
    get,
    path = "/webhook/logs",
    params(LogsQuery),
    responses(
        (status = 200, description = "Recent log entries", body = WebhookLogsResponse)
    ),
    tag = "webhook"
)]
pub async fn webhook_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<WebhookLogsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);

    let webhook_events = state
        .activity_log
        .read_webhook_events(limit)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read webhook log");
            Vec::new()
        });
    let auto_replies = state
        .activity_log
        .read_auto_replies(limit)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read auto-reply log");
            Vec::new()
        });

    Json(WebhookLogsResponse {
        webhook_events,
        auto_replies,
    })
}

/// Webhook configuration summary
#[utoipa::path(
    get,
    path = "/webhook/status",
    responses(
        (status = 200, description = "Configuration summary", body = WebhookStatusResponse)
    ),
    tag = "webhook"
)]
pub async fn webhook_status(State(state): State<AppState>) -> Json<WebhookStatusResponse> {
    let config = &state.config;
    Json(WebhookStatusResponse {
        verify_token_configured: config.has_custom_verify_token(),
        page_token_configured: config.page_access_token.is_some(),
        signature_required: config.webhook_require_signature,
        webhook_path: "/webhook".to_string(),
        oauth_configured: config.oauth_settings().is_ok(),
        graph_api_base: config.graph_api_base.clone(),
    })
}
