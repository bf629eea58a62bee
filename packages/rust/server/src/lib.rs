//! HTTP surface for hottake.
//!
//! - `POST /api/analyze` starts a run and streams its encoded events as the body
//! - `GET /health` liveness probe

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use hottake_core::Pipeline;
use hottake_shared::{AppConfig, DefaultsConfig, LimitsConfig};

pub use error::ApiError;

/// Shared state for all handlers.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub defaults: DefaultsConfig,
    pub limits: LimitsConfig,
}

impl AppState {
    pub fn new(pipeline: Pipeline, config: &AppConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            defaults: config.defaults.clone(),
            limits: config.limits.clone(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/analyze", post(routes::analyze))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let addr: SocketAddr = listener.local_addr()?;
    info!(%addr, "hottake server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
