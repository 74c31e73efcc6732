use anyhow::{Context, Result};
use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

pub fn routes() -> Router {
    Router::new().route("/health", get(health))
}

async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }),
    )
}

/// Bind the health listener on all interfaces.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health server to {addr}"))?;

    info!("Server running on port {}", port);
    Ok(listener)
}

/// Serve the health endpoint until the process exits.
pub async fn serve(listener: TcpListener) -> Result<()> {
    axum::serve(listener, routes())
        .await
        .context("Health server error")?;

    Ok(())
}
