use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Requests waiting for a worker.
    pub queue_depth: usize,
    pub queue_capacity: usize,
}

/// GET /health -- service status and worker queue occupancy.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_depth = state.queue.depth();
    let queue_capacity = state.queue.capacity();
    let status = if queue_depth >= queue_capacity {
        "busy"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        queue_depth,
        queue_capacity,
    })
}

/// GET /healthz -- uptime ping.
async fn ping() -> &'static str {
    "pong"
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(ping))
}
