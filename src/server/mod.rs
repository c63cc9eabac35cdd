//! HTTP surface: `POST /predict`, the gated front-end page and `/health`.

mod auth;
mod handlers;
mod types;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::{SessionGate, TrustedHeaderGate};
pub use types::{ErrorResponse, HealthResponse};

use crate::config::ServerConfig;
use crate::inference::InferenceService;

/// Room for multipart headers and boundaries on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state for the handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InferenceService>,
    pub gate: Arc<dyn SessionGate>,
    pub static_dir: PathBuf,
    pub signin_url: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        service: Arc<InferenceService>,
        gate: Arc<dyn SessionGate>,
    ) -> Self {
        Self {
            service,
            gate,
            static_dir: config.static_dir.clone(),
            signin_url: config.signin_url.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Build the router with body limit, tracing and CORS layers
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(handlers::index))
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .nest_service("/static", ServeDir::new(&state.static_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &ServerConfig, service: Arc<InferenceService>) -> anyhow::Result<()> {
    let gate = Arc::new(TrustedHeaderGate::new(&config.auth_header)?);
    let app = build_router(AppState::new(config, service, gate));

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Speech emotion service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}
