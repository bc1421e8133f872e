//! Instagram business account lookup.
//!
//! Resolution order:
//! 1. Pages the user manages (`/me/accounts`); the first one linked to an
//!    Instagram business account wins and that account is fetched.
//! 2. The account linked directly on `/me`.
//! 3. `no_instagram_business_account_found`.

use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ApiError, transport_error, upstream_error};
use crate::graph::{GraphClient, GraphError, GraphResponse};

const ACCOUNTS_FIELDS: &str = "id,name,instagram_business_account";
const ACCOUNT_FIELDS: &str = "id,username,profile_picture_url,followers_count,media_count";
const ME_FIELDS: &str = "id,name,instagram_business_account{id,username,profile_picture_url}";

/// Where the access token for a lookup came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Store,
    Environment,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::Store => "store",
            TokenSource::Environment => "environment",
        }
    }
}

/// Pick the stored token, else the environment fallback.
pub fn resolve_token(
    stored: Option<String>,
    fallback: Option<&str>,
) -> Option<(String, TokenSource)> {
    stored
        .filter(|token| !token.is_empty())
        .map(|token| (token, TokenSource::Store))
        .or_else(|| {
            fallback
                .filter(|token| !token.is_empty())
                .map(|token| (token.to_string(), TokenSource::Environment))
        })
}

/// Profile lookup errors
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no access token stored or configured")]
    NoAccessToken,

    #[error("Graph API returned status {}", .0.status)]
    Upstream(GraphResponse),

    #[error("Graph API request failed: {0}")]
    Transport(#[from] GraphError),

    #[error("no Instagram business account linked ({pages} pages checked)")]
    NotFound { pages: usize },
}

impl From<ProfileError> for ApiError {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::NoAccessToken => {
                ApiError::new(StatusCode::UNAUTHORIZED, "no_access_token")
            }
            ProfileError::Upstream(upstream) => upstream_error("upstream_fetch_failed", &upstream),
            ProfileError::Transport(e) => transport_error("upstream_fetch_failed", e.to_string()),
            ProfileError::NotFound { pages } => {
                ApiError::new(StatusCode::NOT_FOUND, "no_instagram_business_account_found")
                    .with_context("pages", pages)
            }
        }
    }
}

/// Resolve the Instagram business account visible to `token`.
pub async fn fetch_business_account(
    graph: &GraphClient,
    token: &str,
) -> Result<Value, ProfileError> {
    let accounts = graph
        .get(
            "/me/accounts",
            &[("fields", ACCOUNTS_FIELDS), ("access_token", token)],
        )
        .await?;
    if !accounts.is_ok() {
        return Err(ProfileError::Upstream(accounts));
    }

    let pages: &[Value] = accounts
        .body
        .as_json()
        .and_then(|body| body.get("data"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let linked = pages.iter().find_map(|page| {
        page.get("instagram_business_account")
            .and_then(|account| account.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    });

    if let Some(ig_id) = linked {
        debug!(ig_id, "Found page-linked Instagram business account");
        let account = graph
            .get(
                &format!("/{ig_id}"),
                &[("fields", ACCOUNT_FIELDS), ("access_token", token)],
            )
            .await?;
        if account.is_ok()
            && let Some(body) = account.body.as_json()
        {
            return Ok(body.clone());
        }
        return Err(ProfileError::Upstream(account));
    }

    let me = graph
        .get("/me", &[("fields", ME_FIELDS), ("access_token", token)])
        .await?;
    if me.is_ok()
        && let Some(account) = me
            .body
            .as_json()
            .and_then(|body| body.get("instagram_business_account"))
            .filter(|account| account.is_object())
    {
        debug!("Using Instagram business account linked on /me");
        return Ok(account.clone());
    }
    if !me.is_ok() {
        warn!(status = me.status, "Fallback /me lookup failed");
    }

    Err(ProfileError::NotFound { pages: pages.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn stored_token_wins_over_environment() {
        assert_eq!(
            resolve_token(Some("stored".into()), Some("env")),
            Some(("stored".to_string(), TokenSource::Store))
        );
        assert_eq!(
            resolve_token(None, Some("env")),
            Some(("env".to_string(), TokenSource::Environment))
        );
        assert_eq!(resolve_token(Some(String::new()), None), None);
    }

    #[tokio::test]
    async fn page_linked_account_is_fetched() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/accounts"))
            .and(query_param("access_token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "p0", "name": "No IG"},
                    {"id": "p1", "name": "Shop", "instagram_business_account": {"id": "ig1"}}
                ]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ig1"))
            .and(query_param("fields", ACCOUNT_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ig1", "username": "grace_shop", "followers_count": 10, "media_count": 3
            })))
            .mount(&mock_server)
            .await;

        let graph = GraphClient::new(mock_server.uri()).unwrap();
        let account = fetch_business_account(&graph, "tok").await.unwrap();
        assert_eq!(account["username"], "grace_shop");
    }

    #[tokio::test]
    async fn falls_back_to_me_then_not_found() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/accounts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"id": "p0"}, {"id": "p1"}]})),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u", "name": "U"})))
            .mount(&mock_server)
            .await;

        let graph = GraphClient::new(mock_server.uri()).unwrap();
        let err = fetch_business_account(&graph, "tok").await.unwrap_err();
        assert!(matches!(err, ProfileError::NotFound { pages: 2 }));

        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.context["pages"], 2);
    }

    #[tokio::test]
    async fn me_linked_account_is_returned() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u",
                "instagram_business_account": {"id": "ig9", "username": "direct"}
            })))
            .mount(&mock_server)
            .await;

        let graph = GraphClient::new(mock_server.uri()).unwrap();
        let account = fetch_business_account(&graph, "tok").await.unwrap();
        assert_eq!(account["id"], "ig9");
    }

    #[tokio::test]
    async fn accounts_failure_is_forwarded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/accounts"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Invalid OAuth access token", "code": 190}
            })))
            .mount(&mock_server)
            .await;

        let graph = GraphClient::new(mock_server.uri()).unwrap();
        let api: ApiError = fetch_business_account(&graph, "bad")
            .await
            .unwrap_err()
            .into();
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.error.as_ref(), "upstream_fetch_failed");
        assert_eq!(api.details().unwrap()["error"]["code"], 190);
    }
}
