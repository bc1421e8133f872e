//! # Login Handlers
//!
//! Starts the Facebook login redirect and completes its callback.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{
        HeaderMap, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use utoipa::IntoParams;

use crate::cookies::{
    self, CSRF_COOKIE, CSRF_MAX_AGE_SECS, CookieOptions, OAUTH_STATE_COOKIE,
    OAUTH_STATE_MAX_AGE_SECS,
};
use crate::error::{ApiError, internal_error};
use crate::oauth::{self, AuthorizeRequest, OAuthFlow};
use crate::server::AppState;

/// Provider response on the legacy callback
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LegacyCallbackQuery {
    /// Authorization code
    pub code: Option<String>,
    /// Error reported by the provider
    pub error: Option<String>,
}

fn not_configured_page(missing: &[&str]) -> Html<String> {
    Html(format!(
        "<html><body><h3>Login not configured</h3><p>Set {} in the environment.</p></body></html>",
        missing.join(" and ")
    ))
}

/// Redirect to the Facebook login dialog
///
/// Sets the `oauth_state` cookie checked by the callback.
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 302, description = "Redirect to the authorize dialog"),
        (status = 200, description = "Login not configured", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn login(State(state): State<AppState>) -> Result<Response, ApiError> {
    let request = match AuthorizeRequest::from_config(&state.config) {
        Ok(request) => request,
        Err(missing) => return Ok(not_configured_page(&missing).into_response()),
    };

    let nonce = oauth::generate_state();
    let url = request
        .authorize_url(&state.config.oauth_dialog_base, &nonce)
        .map_err(|e| {
            error!(error = %e, "Failed to build authorize URL");
            internal_error()
        })?;

    let cookie = cookies::set_cookie(
        OAUTH_STATE_COOKIE,
        &nonce,
        CookieOptions {
            http_only: true,
            secure: state.config.cookie_secure,
            max_age_secs: OAUTH_STATE_MAX_AGE_SECS,
        },
    );

    info!("Redirecting to authorize dialog");
    redirect_with_cookies(url.as_str(), &[cookie])
}

/// Complete the login callback
///
/// Exchanges the code for a long-lived token and stores it. Also served at
/// `/instagram/callback`.
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "State nonce echoed by the dialog")
    ),
    responses(
        (status = 302, description = "Token stored; redirect to the home page"),
        (status = 400, description = "Missing code, state mismatch or unparsable query", body = crate::error::ErrorResponse),
        (status = 500, description = "OAuth not configured or exchange failed", body = crate::error::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query?;
    let state_cookie = cookies::extract_cookie_value(&headers, OAUTH_STATE_COOKIE);

    OAuthFlow::new(&state.config, &state.graph, state.token_store.as_ref())
        .complete_callback(&params, state_cookie.as_deref())
        .await?;

    let csrf_cookie = cookies::set_cookie(
        CSRF_COOKIE,
        &oauth::generate_state(),
        CookieOptions {
            http_only: false,
            secure: state.config.cookie_secure,
            max_age_secs: CSRF_MAX_AGE_SECS,
        },
    );

    redirect_with_cookies("/", &[cookies::clear_cookie(OAUTH_STATE_COOKIE), csrf_cookie])
}

/// Echo the provider's callback parameters
#[utoipa::path(
    get,
    path = "/callback",
    params(LegacyCallbackQuery),
    responses(
        (status = 200, description = "Authorization code received"),
        (status = 400, description = "Provider reported an error, or the query is unparsable")
    ),
    tag = "auth"
)]
pub async fn legacy_callback(
    query: Result<Query<LegacyCallbackQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    Ok(match query.error {
        Some(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response(),
        None => Json(json!({ "code": query.code })).into_response(),
    })
}

fn redirect_with_cookies(location: &str, set_cookies: &[String]) -> Result<Response, ApiError> {
    let mut response = StatusCode::FOUND.into_response();
    let headers = response.headers_mut();

    headers.insert(
        LOCATION,
        cookies::header_value(location).ok_or_else(internal_error)?,
    );
    for cookie in set_cookies {
        headers.append(
            SET_COOKIE,
            cookies::header_value(cookie).ok_or_else(internal_error)?,
        );
    }

    Ok(response)
}
