//! Router assembly.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::relay::ChatRelay;

use super::{health, ws};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
}

/// Build the relay router: `/ws` for chat clients, `/health` for probes.
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
