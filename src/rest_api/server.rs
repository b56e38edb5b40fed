//! Axum HTTP server for health and metrics

use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Json, Router};
use prometheus_client::encoding::text::encode;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::controller::metrics::REGISTRY;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Metrics endpoint handler
async fn metrics_handler() -> std::result::Result<String, StatusCode> {
    let mut buffer = String::new();
    encode(&mut buffer, &REGISTRY).map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(buffer)
}

pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
}

/// Run the health and metrics server
pub async fn run_server(addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Metrics server listening on {}", addr);

    axum::serve(listener, router())
        .await
        .map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

    Ok(())
}
