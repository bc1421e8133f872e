//! # API Handlers
//!
//! HTTP endpoint handlers. Static pages and health live here; each protocol
//! area has its own submodule.

use axum::response::{Html, Json};

use crate::models::ServiceInfo;

pub mod auth;
pub mod instagram;
pub mod token;
pub mod webhook;

const HOME_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Grace</title></head>
<body>
  <h1>Grace</h1>
  <p>Connect your Instagram business account so Grace can answer your customers' direct messages.</p>
  <p><a href="/login">Continue with Facebook</a></p>
  <p><a href="/instagram/profile">View connected account</a></p>
  <footer><a href="/privacy">Privacy</a> &middot; <a href="/terms">Terms</a></footer>
</body>
</html>"#;

const PRIVACY_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Grace Privacy Policy</title></head>
<body>
  <h1>Privacy Policy</h1>
  <p>Grace stores one access token for the connected account and a log of received messages and automated replies.
  Nothing is shared with third parties.</p>
  <p>To remove your data, disconnect the app from your Facebook settings or call <code>/delete-data</code>.</p>
</body>
</html>"#;

const TERMS_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Grace Terms of Service</title></head>
<body>
  <h1>Terms of Service</h1>
  <p>Grace is provided as a demonstration. Automated replies are sent on behalf of the connected account.</p>
</body>
</html>"#;

/// Home page
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Home page", body = String, content_type = "text/html")
    ),
    tag = "pages"
)]
pub async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

#[utoipa::path(
    get,
    path = "/privacy",
    responses(
        (status = 200, description = "Privacy policy", body = String, content_type = "text/html")
    ),
    tag = "pages"
)]
pub async fn privacy() -> Html<&'static str> {
    Html(PRIVACY_PAGE)
}

#[utoipa::path(
    get,
    path = "/terms",
    responses(
        (status = 200, description = "Terms of service", body = String, content_type = "text/html")
    ),
    tag = "pages"
)]
pub async fn terms() -> Html<&'static str> {
    Html(TERMS_PAGE)
}

/// Basic service information
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn health() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}
