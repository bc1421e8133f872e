//! Test utilities shared by the integration tests.
//!
//! Builds the application against a temporary data directory and a wiremock
//! Graph API, either as an in-process `Router` or behind a real listener.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, body::to_bytes, response::Response};
use grace_connect::{
    config::AppConfig,
    server::{AppState, create_app},
    store::{FileTokenStore, TokenStore},
};
use serde_json::Value;
use tempfile::TempDir;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use wiremock::MockServer;

/// Application wired to a mock Graph API and a temporary data directory
pub struct TestApp {
    pub router: Router,
    pub config: AppConfig,
    pub token_store: Arc<FileTokenStore>,
    pub graph: MockServer,
    pub data_dir: TempDir,
}

impl TestApp {
    /// Start with OAuth fully configured; `customize` adjusts the config before the app is built.
    pub async fn new(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let graph = MockServer::start().await;
        let data_dir = TempDir::new().expect("temp data dir");

        let mut config = AppConfig {
            data_dir: data_dir.path().to_path_buf(),
            graph_api_base: graph.uri(),
            cookie_secure: false,
            client_id: Some("test-app-id".to_string()),
            client_secret: Some("test-app-secret".to_string()),
            redirect_uri: Some("http://localhost/auth/callback".to_string()),
            webhook_verify_token: "test-verify-token".to_string(),
            ..AppConfig::default()
        };
        customize(&mut config);

        let token_store = Arc::new(FileTokenStore::new(&config.data_dir));
        let state = AppState::new(config.clone(), token_store.clone()).expect("app state");

        Self {
            router: create_app(state),
            config,
            token_store,
            graph,
            data_dir,
        }
    }

    pub async fn stored_token(&self) -> Option<String> {
        self.token_store.load().await.expect("token store readable")
    }

    pub fn webhook_log(&self) -> Vec<Value> {
        read_json_lines(&self.data_dir.path().join("webhook.log"))
    }

    pub fn auto_reply_log(&self) -> Vec<Value> {
        read_json_lines(&self.data_dir.path().join("auto_replies.log"))
    }
}

/// Parse a JSON-lines file; a missing file reads as empty.
pub fn read_json_lines(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("log line is JSON"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("body is UTF-8")
}

/// Handle to a server spawned on an ephemeral port
pub struct TestServerHandle {
    pub base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl TestServerHandle {
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }

        Ok(())
    }
}

/// Serve `router` on `127.0.0.1:0` until the handle is shut down.
pub async fn spawn_server(router: Router) -> TestServerHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let join_handle = tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let _ = ready_tx.send(());

        server.await.context("axum server error")
    });

    ready_rx.await.expect("server task to signal readiness");

    TestServerHandle {
        base_url: format!("http://{}", addr),
        shutdown_tx: Some(shutdown_tx),
        join_handle: Some(join_handle),
    }
}
