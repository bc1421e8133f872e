//! # Instagram Account Handlers

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::cookies::{self, CSRF_COOKIE, CSRF_HEADER};
use crate::error::ApiError;
use crate::profile::{self, ProfileError};
use crate::server::AppState;
use crate::store;

/// Outcome of a disconnect
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DisconnectResponse {
    /// Whether the platform accepted the permission revoke
    pub revoked: bool,
    /// Platform response body, or the transport error
    #[schema(value_type = Object)]
    pub response: Value,
}

/// Connected Instagram business account
///
/// Uses the stored token, else `INSTAGRAM_ACCESS_TOKEN`.
#[utoipa::path(
    get,
    path = "/instagram/profile",
    responses(
        (status = 200, description = "Instagram business account", content_type = "application/json"),
        (status = 401, description = "No access token available", body = crate::error::ErrorResponse),
        (status = 404, description = "No linked business account", body = crate::error::ErrorResponse)
    ),
    tag = "instagram"
)]
pub async fn profile(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stored = store::load_or_none(state.token_store.as_ref()).await;
    let (token, source) =
        profile::resolve_token(stored, state.config.fallback_access_token.as_deref())
            .ok_or(ProfileError::NoAccessToken)?;

    info!(source = source.as_str(), "Fetching Instagram business account");
    let account = profile::fetch_business_account(&state.graph, &token).await?;
    Ok(Json(account))
}

/// Disconnect the account
///
/// Requires the `csrf_token` cookie to be echoed in `X-CSRF-Token`. Revokes
/// the app's permissions best-effort and always clears the stored token.
#[utoipa::path(
    delete,
    path = "/instagram/disconnect",
    params(
        ("X-CSRF-Token" = String, Header, description = "Value of the csrf_token cookie")
    ),
    responses(
        (status = 200, description = "Local token cleared", body = DisconnectResponse),
        (status = 403, description = "CSRF check failed", body = crate::error::ErrorResponse)
    ),
    tag = "instagram"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DisconnectResponse>, ApiError> {
    if !csrf_matches(&headers) {
        warn!("Disconnect rejected: CSRF token mismatch");
        return Err(ApiError::new(StatusCode::FORBIDDEN, "invalid_csrf"));
    }

    let (revoked, response) = match store::load_or_none(state.token_store.as_ref()).await {
        Some(token) => match state
            .graph
            .delete("/me/permissions", &[("access_token", token.as_str())])
            .await
        {
            Ok(upstream) => (upstream.is_ok(), upstream.body.to_value()),
            Err(e) => {
                warn!(error = %e, "Permission revoke failed");
                (false, json!({ "error": e.to_string() }))
            }
        },
        None => (false, Value::Null),
    };

    store::clear_logged(state.token_store.as_ref()).await;
    info!(revoked, "Instagram account disconnected");

    Ok(Json(DisconnectResponse { revoked, response }))
}

fn csrf_matches(headers: &HeaderMap) -> bool {
    let cookie = cookies::extract_cookie_value(headers, CSRF_COOKIE);
    let header = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    match (cookie, header) {
        (Some(cookie), Some(header)) => bool::from(cookie.as_bytes().ct_eq(header.as_bytes())),
        _ => false,
    }
}
