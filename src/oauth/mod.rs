//! # OAuth Exchange Flow
//!
//! Facebook Login for Business: the authorization code is traded for a
//! short-lived user token, which is immediately traded for a long-lived one
//! and persisted. The sequence is linear:
//!
//! `AWAIT_CODE -> CODE_RECEIVED -> SHORT_TOKEN_OBTAINED -> LONG_TOKEN_OBTAINED -> PERSISTED`
//!
//! Every step either advances or fails terminally; nothing is retried.

use std::collections::BTreeMap;
use std::fmt;

use axum::http::StatusCode;
use metrics::counter;
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::config::{AppConfig, OAuthSettings};
use crate::error::{ApiError, transport_error, upstream_error};
use crate::graph::{GraphClient, GraphError, GraphResponse};
use crate::store::TokenStore;

const TOKEN_ENDPOINT: &str = "/oauth/access_token";

/// Step of the exchange, used to label failures and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    CodeExchange,
    LongTokenExchange,
}

impl ExchangeStage {
    /// Error kind reported when this stage fails
    pub fn error_kind(&self) -> &'static str {
        match self {
            ExchangeStage::CodeExchange => "code_exchange_failed",
            ExchangeStage::LongTokenExchange => "long_token_exchange_failed",
        }
    }
}

impl fmt::Display for ExchangeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeStage::CodeExchange => write!(f, "code_exchange"),
            ExchangeStage::LongTokenExchange => write!(f, "long_token_exchange"),
        }
    }
}

/// OAuth flow errors
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("callback is missing the authorization code")]
    MissingCode { params: BTreeMap<String, String> },

    #[error("state parameter does not match the state cookie")]
    InvalidState,

    #[error("OAuth is not configured (missing: {})", .missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },

    #[error("code exchange rejected with status {}", .0.status)]
    CodeExchange(GraphResponse),

    #[error("long-lived token exchange rejected with status {}", .0.status)]
    LongTokenExchange(GraphResponse),

    #[error("{stage} request failed: {source}")]
    Transport {
        stage: ExchangeStage,
        #[source]
        source: GraphError,
    },
}

impl From<OAuthError> for ApiError {
    fn from(error: OAuthError) -> Self {
        match error {
            OAuthError::MissingCode { params } => {
                let params: Map<String, Value> = params
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                ApiError::new(StatusCode::BAD_REQUEST, "missing_code")
                    .with_context("params", Value::Object(params))
            }
            OAuthError::InvalidState => ApiError::new(StatusCode::BAD_REQUEST, "invalid_state"),
            OAuthError::NotConfigured { missing } => {
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "oauth_not_configured")
                    .with_context("missing", missing)
            }
            OAuthError::CodeExchange(upstream) => {
                upstream_error(ExchangeStage::CodeExchange.error_kind(), &upstream)
            }
            OAuthError::LongTokenExchange(upstream) => {
                upstream_error(ExchangeStage::LongTokenExchange.error_kind(), &upstream)
            }
            OAuthError::Transport { stage, source } => {
                transport_error(stage.error_kind(), source.to_string())
            }
        }
    }
}

/// Result of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    /// Whether the long-lived token reached the store
    pub persisted: bool,
}

/// Generate a fresh state nonce: 24 random bytes, URL-safe base64.
pub fn generate_state() -> String {
    use rand::Rng;

    let mut bytes = [0u8; 24];
    rand::thread_rng().fill(&mut bytes);

    base64_url::encode(&bytes)
}

/// Parameters of the authorize dialog redirect
#[derive(Debug, Clone, Copy)]
pub struct AuthorizeRequest<'a> {
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
}

impl<'a> AuthorizeRequest<'a> {
    /// Client id and redirect URI from config; the secret is not needed to start a login.
    /// Returns the names of the missing variables otherwise.
    pub fn from_config(config: &'a AppConfig) -> Result<Self, Vec<&'static str>> {
        match (config.client_id.as_deref(), config.redirect_uri.as_deref()) {
            (Some(client_id), Some(redirect_uri)) => Ok(Self {
                client_id,
                redirect_uri,
                scope: &config.oauth_scope,
            }),
            (client_id, redirect_uri) => {
                let mut missing = Vec::new();
                if client_id.is_none() {
                    missing.push("INSTAGRAM_CLIENT_ID");
                }
                if redirect_uri.is_none() {
                    missing.push("INSTAGRAM_REDIRECT_URI");
                }
                Err(missing)
            }
        }
    }

    /// Build the authorize dialog URL for `state`.
    pub fn authorize_url(&self, dialog_base: &str, state: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            dialog_base,
            &[
                ("client_id", self.client_id),
                ("redirect_uri", self.redirect_uri),
                ("scope", self.scope),
                ("response_type", "code"),
                ("state", state),
            ],
        )
    }
}

/// Whether a callback `state` satisfies the state cookie. Without a cookie there is nothing to check.
pub fn state_matches(state_param: Option<&str>, state_cookie: Option<&str>) -> bool {
    match state_cookie {
        None => true,
        Some(expected) => state_param
            .map(|actual| bool::from(actual.as_bytes().ct_eq(expected.as_bytes())))
            .unwrap_or(false),
    }
}

/// Drives one callback through the exchange sequence.
pub struct OAuthFlow<'a> {
    config: &'a AppConfig,
    graph: &'a GraphClient,
    store: &'a dyn TokenStore,
}

impl<'a> OAuthFlow<'a> {
    pub fn new(config: &'a AppConfig, graph: &'a GraphClient, store: &'a dyn TokenStore) -> Self {
        Self {
            config,
            graph,
            store,
        }
    }

    /// Complete a callback.
    ///
    /// Checks run in order: code present, state matches, configuration
    /// complete. No HTTP call is made until all three pass.
    pub async fn complete_callback(
        &self,
        params: &BTreeMap<String, String>,
        state_cookie: Option<&str>,
    ) -> Result<ExchangeOutcome, OAuthError> {
        let result = self.run(params, state_cookie).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(OAuthError::MissingCode { .. }) => "missing_code",
            Err(OAuthError::InvalidState) => "invalid_state",
            Err(OAuthError::NotConfigured { .. }) => "not_configured",
            Err(_) => "exchange_failed",
        };
        counter!("oauth_callbacks_total", "outcome" => outcome).increment(1);
        result
    }

    async fn run(
        &self,
        params: &BTreeMap<String, String>,
        state_cookie: Option<&str>,
    ) -> Result<ExchangeOutcome, OAuthError> {
        let code = match params.get("code").filter(|code| !code.is_empty()) {
            Some(code) => code,
            None => {
                return Err(OAuthError::MissingCode {
                    params: params.clone(),
                });
            }
        };

        if !state_matches(params.get("state").map(String::as_str), state_cookie) {
            warn!("OAuth callback state mismatch");
            return Err(OAuthError::InvalidState);
        }

        let settings = self
            .config
            .oauth_settings()
            .map_err(|missing| OAuthError::NotConfigured { missing })?;

        let short_lived = self.exchange_code(&settings, code).await?;
        let long_lived = self.exchange_long_lived(&settings, &short_lived).await?;

        let persisted = match self.store.save(&long_lived).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to persist long-lived token");
                false
            }
        };

        info!(persisted, "OAuth exchange completed");
        Ok(ExchangeOutcome { persisted })
    }

    async fn exchange_code(
        &self,
        settings: &OAuthSettings,
        code: &str,
    ) -> Result<String, OAuthError> {
        let stage = ExchangeStage::CodeExchange;
        let response = self
            .graph
            .get(
                TOKEN_ENDPOINT,
                &[
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                    ("redirect_uri", settings.redirect_uri.as_str()),
                    ("code", code),
                ],
            )
            .await
            .map_err(|source| OAuthError::Transport { stage, source })?;

        take_access_token(stage, response).map_err(OAuthError::CodeExchange)
    }

    async fn exchange_long_lived(
        &self,
        settings: &OAuthSettings,
        short_lived: &str,
    ) -> Result<String, OAuthError> {
        let stage = ExchangeStage::LongTokenExchange;
        let response = self
            .graph
            .get(
                TOKEN_ENDPOINT,
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                    ("fb_exchange_token", short_lived),
                ],
            )
            .await
            .map_err(|source| OAuthError::Transport { stage, source })?;

        take_access_token(stage, response).map_err(OAuthError::LongTokenExchange)
    }
}

/// 200 with a non-empty `access_token`, or the upstream response back as the failure.
fn take_access_token(
    stage: ExchangeStage,
    response: GraphResponse,
) -> Result<String, GraphResponse> {
    if response.is_ok()
        && let Some(token) = response.str_field("access_token")
    {
        return Ok(token.to_string());
    }

    warn!(%stage, status = response.status, "Token exchange rejected");
    Err(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(graph_base: &str) -> AppConfig {
        AppConfig {
            graph_api_base: graph_base.to_string(),
            client_id: Some("app-id".to_string()),
            client_secret: Some("app-secret".to_string()),
            redirect_uri: Some("https://grace.example/auth/callback".to_string()),
            ..AppConfig::default()
        }
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn state_nonce_is_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), 32);
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(state, generate_state());
    }

    #[test]
    fn authorize_url_carries_all_parameters() {
        let config = AppConfig {
            oauth_scope: "instagram_basic,pages_show_list".to_string(),
            ..config_for("http://127.0.0.1:9")
        };

        let url = AuthorizeRequest::from_config(&config)
            .unwrap()
            .authorize_url("https://www.facebook.com/v23.0/dialog/oauth", "nonce")
            .unwrap();
        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(query["client_id"], "app-id");
        assert_eq!(query["redirect_uri"], "https://grace.example/auth/callback");
        assert_eq!(query["scope"], "instagram_basic,pages_show_list");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["state"], "nonce");
        assert!(!query.contains_key("client_secret"));
    }

    #[test]
    fn authorize_request_needs_client_id_and_redirect() {
        let config = AppConfig {
            client_id: Some("app-id".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(
            AuthorizeRequest::from_config(&config).unwrap_err(),
            vec!["INSTAGRAM_REDIRECT_URI"]
        );
    }

    #[test]
    fn state_check_only_applies_with_cookie() {
        assert!(state_matches(None, None));
        assert!(state_matches(Some("abc"), None));
        assert!(state_matches(Some("abc"), Some("abc")));
        assert!(!state_matches(Some("abd"), Some("abc")));
        assert!(!state_matches(None, Some("abc")));
    }

    #[tokio::test]
    async fn full_exchange_persists_long_lived_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/access_token"))
            .and(query_param("code", "auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "short"})))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth/access_token"))
            .and(query_param("grant_type", "fb_exchange_token"))
            .and(query_param("fb_exchange_token", "short"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "long"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server.uri());
        let graph = GraphClient::new(&config.graph_api_base).unwrap();
        let store = MemoryTokenStore::new();

        let outcome = OAuthFlow::new(&config, &graph, &store)
            .complete_callback(&params(&[("code", "auth-code"), ("state", "s")]), Some("s"))
            .await
            .unwrap();

        assert!(outcome.persisted);
        assert_eq!(store.load().await.unwrap().as_deref(), Some("long"));
    }

    #[tokio::test]
    async fn missing_code_echoes_params() {
        let config = config_for("http://127.0.0.1:9");
        let graph = GraphClient::new(&config.graph_api_base).unwrap();
        let store = MemoryTokenStore::new();

        let err = OAuthFlow::new(&config, &graph, &store)
            .complete_callback(&params(&[("state", "s"), ("code", "")]), None)
            .await
            .unwrap_err();

        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.error.as_ref(), "missing_code");
        assert_eq!(api.context["params"]["state"], "s");
    }

    #[tokio::test]
    async fn unconfigured_flow_names_missing_values() {
        let config = AppConfig {
            client_id: Some("app-id".to_string()),
            ..AppConfig::default()
        };
        let graph = GraphClient::new("http://127.0.0.1:9").unwrap();
        let store = MemoryTokenStore::new();

        let err = OAuthFlow::new(&config, &graph, &store)
            .complete_callback(&params(&[("code", "c")]), None)
            .await
            .unwrap_err();

        match err {
            OAuthError::NotConfigured { missing } => {
                assert_eq!(
                    missing,
                    vec!["INSTAGRAM_CLIENT_SECRET", "INSTAGRAM_REDIRECT_URI"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn long_token_failure_forwards_upstream() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth/access_token"))
            .and(query_param("code", "auth-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "short"})))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth/access_token"))
            .and(query_param("grant_type", "fb_exchange_token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"error": {"message": "expired", "code": 190}})),
            )
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server.uri());
        let graph = GraphClient::new(&config.graph_api_base).unwrap();
        let store = MemoryTokenStore::new();

        let err = OAuthFlow::new(&config, &graph, &store)
            .complete_callback(&params(&[("code", "auth-code")]), None)
            .await
            .unwrap_err();
        let api: ApiError = err.into();

        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.error.as_ref(), "long_token_exchange_failed");
        assert_eq!(api.details().unwrap()["error"]["code"], 190);
        assert_eq!(store.load().await.unwrap(), None);
    }
}
