//! # Server Configuration
//!
//! Router assembly, shared state and the listener loop for the Grace connect service.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get},
};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::graph::{GraphClient, GraphError};
use crate::handlers;
use crate::reply::ReplyDispatcher;
use crate::store::{ActivityLog, FileTokenStore, TokenStore};
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub graph: GraphClient,
    pub token_store: Arc<dyn TokenStore>,
    pub activity_log: ActivityLog,
    pub replies: ReplyDispatcher,
}

impl AppState {
    /// Build state around `token_store`; logs and the Graph client follow `config`.
    pub fn new(config: AppConfig, token_store: Arc<dyn TokenStore>) -> Result<Self, GraphError> {
        let graph = GraphClient::new(&config.graph_api_base)?;
        let activity_log = ActivityLog::new(&config.data_dir);
        let replies = ReplyDispatcher::new(
            graph.clone(),
            config.page_access_token.clone(),
            activity_log.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            graph,
            token_store,
            activity_log,
            replies,
        })
    }

    /// State backed by the file token store under `data_dir`.
    pub fn from_config(config: AppConfig) -> Result<Self, GraphError> {
        let token_store = Arc::new(FileTokenStore::new(&config.data_dir));
        Self::new(config, token_store)
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/privacy", get(handlers::privacy))
        .route("/terms", get(handlers::terms))
        .route("/health", get(handlers::health))
        .route("/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::oauth_callback))
        .route("/instagram/callback", get(handlers::auth::oauth_callback))
        .route("/callback", get(handlers::auth::legacy_callback))
        .route(
            "/webhook",
            get(handlers::webhook::verify_webhook).post(handlers::webhook::ingest_webhook),
        )
        .route("/webhook/logs", get(handlers::webhook::webhook_logs))
        .route("/webhook/status", get(handlers::webhook::webhook_status))
        .route("/instagram/profile", get(handlers::instagram::profile))
        .route("/instagram/disconnect", delete(handlers::instagram::disconnect))
        .route(
            "/token",
            get(handlers::token::token_status).delete(handlers::token::clear_token),
        )
        .route("/token/inspect", get(handlers::token::inspect_token))
        .route(
            "/deauthorize",
            get(handlers::token::deauthorize).post(handlers::token::deauthorize),
        )
        .route(
            "/delete-data",
            get(handlers::token::delete_data).post(handlers::token::delete_data),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::from_config(config)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::home,
        crate::handlers::privacy,
        crate::handlers::terms,
        crate::handlers::health,
        crate::handlers::auth::login,
        crate::handlers::auth::oauth_callback,
        crate::handlers::auth::legacy_callback,
        crate::handlers::webhook::verify_webhook,
        crate::handlers::webhook::ingest_webhook,
        crate::handlers::webhook::webhook_logs,
        crate::handlers::webhook::webhook_status,
        crate::handlers::instagram::profile,
        crate::handlers::instagram::disconnect,
        crate::handlers::token::token_status,
        crate::handlers::token::clear_token,
        crate::handlers::token::inspect_token,
        crate::handlers::token::deauthorize,
        crate::handlers::token::delete_data,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::WebhookEvent,
            crate::models::AutoReplyRecord,
            crate::models::ReplyStatus,
            crate::error::ErrorResponse,
            crate::handlers::webhook::WebhookAck,
            crate::handlers::webhook::WebhookLogsResponse,
            crate::handlers::webhook::WebhookStatusResponse,
            crate::handlers::instagram::DisconnectResponse,
            crate::handlers::token::TokenStatusResponse,
            crate::handlers::token::TokenClearedResponse,
            crate::handlers::token::TokenInspectResponse,
            crate::handlers::token::PlatformCallbackResponse,
        )
    ),
    info(
        title = "Grace Connect API",
        description = "Instagram login, webhook ingestion and auto-replies for Grace",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
