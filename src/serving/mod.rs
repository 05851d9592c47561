//! Prediction server
//!
//! `POST /predict` runs the loaded model on tokio's blocking pool and always
//! answers 200 with a [`PredictionResponse`]; `GET /health` reports liveness.

pub mod handlers;

pub use handlers::{PredictionRequest, PredictionResponse};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::registry::Adapter;

/// Server bind address
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
        }
    }
}

/// Shared handler state
#[derive(Debug)]
pub struct AppState {
    pub adapter: Arc<Adapter>,
    pub model_uri: String,
}

impl AppState {
    pub fn new(adapter: Arc<Adapter>, model_uri: impl Into<String>) -> Self {
        Self {
            adapter,
            model_uri: model_uri.into(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health_check))
        .fallback(handlers::handle_404)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl+c
pub async fn run_server(config: ServerConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, model_uri = %state.model_uri, "Prediction server listening");

    let shutdown_signal = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping server");
        }
    };

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
