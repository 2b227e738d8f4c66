//! Liveness endpoint for load balancers and deploy checks.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::routes::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub rooms: usize,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.relay.registry();
    // If this handler runs, the relay is alive and accepting connections.
    Json(HealthResponse {
        status: "ok",
        connections: registry.connection_count().await,
        rooms: registry.room_count().await,
    })
}
