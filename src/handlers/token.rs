//! # Token Handlers
//!
//! Introspection aids for the stored token and Meta's deauthorize and
//! data-deletion callbacks.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::profile;
use crate::server::AppState;
use crate::store::{self, mask_secret};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenStatusResponse {
    pub stored: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenClearedResponse {
    pub cleared: bool,
}

/// Masked view of the token profile lookups would use
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenInspectResponse {
    /// Whether a token is stored
    pub stored: bool,
    /// `store` or `environment`; null when no token is available
    pub source: Option<String>,
    /// First and last three characters only
    pub masked: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlatformCallbackResponse {
    pub message: String,
}

/// Whether a token is stored
#[utoipa::path(
    get,
    path = "/token",
    responses((status = 200, description = "Token presence", body = TokenStatusResponse)),
    tag = "token"
)]
pub async fn token_status(State(state): State<AppState>) -> Json<TokenStatusResponse> {
    let stored = store::load_or_none(state.token_store.as_ref())
        .await
        .is_some();
    Json(TokenStatusResponse { stored })
}

/// Clear the stored token
#[utoipa::path(
    delete,
    path = "/token",
    responses((status = 200, description = "Token cleared", body = TokenClearedResponse)),
    tag = "token"
)]
pub async fn clear_token(State(state): State<AppState>) -> Json<TokenClearedResponse> {
    store::clear_logged(state.token_store.as_ref()).await;
    Json(TokenClearedResponse { cleared: true })
}

/// Masked token inspection, enabled by `ALLOW_TOKEN_INSPECT`
#[utoipa::path(
    get,
    path = "/token/inspect",
    responses(
        (status = 200, description = "Masked token", body = TokenInspectResponse),
        (status = 403, description = "Inspection disabled", body = crate::error::ErrorResponse)
    ),
    tag = "token"
)]
pub async fn inspect_token(
    State(state): State<AppState>,
) -> Result<Json<TokenInspectResponse>, ApiError> {
    if !state.config.allow_token_inspect {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "token_inspect_disabled"));
    }

    let stored = store::load_or_none(state.token_store.as_ref()).await;
    let is_stored = stored.is_some();
    let resolved = profile::resolve_token(stored, state.config.fallback_access_token.as_deref());

    Ok(Json(TokenInspectResponse {
        stored: is_stored,
        source: resolved
            .as_ref()
            .map(|(_, source)| source.as_str().to_string()),
        masked: resolved.map(|(token, _)| mask_secret(&token)),
    }))
}

/// Meta deauthorize callback
#[utoipa::path(
    get,
    path = "/deauthorize",
    responses((status = 200, description = "Stored token cleared", body = PlatformCallbackResponse)),
    tag = "token"
)]
pub async fn deauthorize(State(state): State<AppState>) -> Json<PlatformCallbackResponse> {
    info!("Deauthorize callback received");
    clear_for_platform(&state).await
}

/// Meta data deletion callback
#[utoipa::path(
    get,
    path = "/delete-data",
    responses((status = 200, description = "Stored token cleared", body = PlatformCallbackResponse)),
    tag = "token"
)]
pub async fn delete_data(State(state): State<AppState>) -> Json<PlatformCallbackResponse> {
    info!("Data deletion callback received");
    clear_for_platform(&state).await
}

async fn clear_for_platform(state: &AppState) -> Json<PlatformCallbackResponse> {
    store::clear_logged(state.token_store.as_ref()).await;
    Json(PlatformCallbackResponse {
        message: "ok".to_string(),
    })
}
