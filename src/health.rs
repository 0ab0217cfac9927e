//! Liveness and readiness endpoints for the hosting platform.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct HealthState {
    pub agent: String,
    pub started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            started_at: Utc::now(),
        }
    }
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agent": state.agent,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}

async fn ready() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Serve the health endpoints on `0.0.0.0:port` until `shutdown` fires
pub async fn serve(
    port: u16,
    state: HealthState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("💓 Health server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
