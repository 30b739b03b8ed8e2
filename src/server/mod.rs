//! HTTP Service
//!
//! Thin axum boundary around [`ExtractionOrchestrator`]: upload and path
//! endpoints, input validation, CORS and status mapping.

pub mod handlers;
pub mod response;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::extraction::ExtractionOrchestrator;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExtractionOrchestrator>,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(orchestrator: ExtractionOrchestrator, server: ServerConfig) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            server: Arc::new(server),
        }
    }
}

/// Build the router with every route and layer
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.server.max_upload_bytes;
    let cors = cors_layer(&state.server.allowed_origins);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/extract-upload", post(handlers::extract_upload))
        .route("/extract-by-path", post(handlers::extract_by_path))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Bind and serve until Ctrl+C
pub async fn serve(state: AppState) -> Result<()> {
    let bind = state.server.bind.clone();
    let app = build_router(state);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("HTTP API listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
