//! Graph API client
//!
//! Thin wrapper over `reqwest` for Meta's Graph API. Every call carries a fixed
//! timeout and hands back the upstream status together with the parsed body;
//! deciding what a non-200 means is left to the caller.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Per-call timeout for every outbound request
pub const GRAPH_TIMEOUT: Duration = Duration::from_secs(10);

/// Graph client errors. Only raised when no HTTP response was received.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph API request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Response body, parsed as JSON when possible
#[derive(Debug, Clone, PartialEq)]
pub enum GraphBody {
    Json(Value),
    Text(String),
}

impl GraphBody {
    /// Parse raw upstream text, keeping it verbatim when it is not JSON.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => GraphBody::Json(value),
            Err(_) => GraphBody::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            GraphBody::Json(value) => Some(value),
            GraphBody::Text(_) => None,
        }
    }

    /// Render as a JSON value; text bodies become JSON strings.
    pub fn to_value(&self) -> Value {
        match self {
            GraphBody::Json(value) => value.clone(),
            GraphBody::Text(text) => Value::String(text.clone()),
        }
    }
}

/// Upstream status plus body
#[derive(Debug, Clone, PartialEq)]
pub struct GraphResponse {
    pub status: u16,
    pub body: GraphBody,
}

impl GraphResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Non-empty string field from a JSON body
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.body
            .as_json()
            .and_then(|body| body.get(name))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Graph API client
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// Create a client against `base_url` (e.g. `https://graph.facebook.com/v23.0`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, GraphError> {
        let http = reqwest::Client::builder()
            .timeout(GRAPH_TIMEOUT)
            .user_agent(concat!("grace-connect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GraphError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with query parameters
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<GraphResponse, GraphError> {
        self.send(Method::GET, path, query, None).await
    }

    /// POST a JSON body to `path`
    pub async fn post_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<GraphResponse, GraphError> {
        self.send(Method::POST, path, query, Some(body)).await
    }

    /// DELETE `path` with query parameters
    pub async fn delete(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<GraphResponse, GraphError> {
        self.send(Method::DELETE, path, query, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<GraphResponse, GraphError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(method = %method, url = %url, "Graph API request");

        let mut request = self.http.request(method, &url).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GraphError::Timeout(GRAPH_TIMEOUT)
            } else {
                GraphError::NetworkError(e)
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!(status, bytes = text.len(), "Graph API response");

        Ok(GraphResponse {
            status,
            body: GraphBody::from_text(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_returns_status_and_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(query_param("access_token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42"})))
            .mount(&mock_server)
            .await;

        let client = GraphClient::new(mock_server.uri()).unwrap();
        let response = client.get("/me", &[("access_token", "tok")]).await.unwrap();

        assert!(response.is_ok());
        assert_eq!(response.str_field("id"), Some("42"));
    }

    #[tokio::test]
    async fn non_json_bodies_are_kept_as_text() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;

        let client = GraphClient::new(mock_server.uri()).unwrap();
        let response = client.get("broken", &[]).await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.body, GraphBody::Text("upstream down".to_string()));
    }

    #[tokio::test]
    async fn post_json_sends_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/me/messages"))
            .and(body_json(json!({"hello": "world"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_id": "m"})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = GraphClient::new(format!("{}/", mock_server.uri())).unwrap();
        let response = client
            .post_json("/me/messages", &[], &json!({"hello": "world"}))
            .await
            .unwrap();

        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn connection_failure_is_an_error() {
        // Nothing listens on port 9 of the loopback interface in test environments.
        let client = GraphClient::new("http://127.0.0.1:9").unwrap();
        assert!(client.get("/me", &[]).await.is_err());
    }

    #[test]
    fn empty_string_fields_count_as_missing() {
        let response = GraphResponse {
            status: 200,
            body: GraphBody::Json(json!({"access_token": ""})),
        };
        assert_eq!(response.str_field("access_token"), None);
    }
}
