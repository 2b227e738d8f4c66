//! HTTP/WebSocket surface of the relay.

pub mod health;
pub mod routes;
pub mod ws;

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use ridechat_core::{Error, Result};

use crate::auth::TokenVerifier;
use crate::config::RelayConfig;
use crate::gateway::PersistenceGateway;
use crate::registry::RoomRegistry;
use crate::relay::{ChatRelay, RoomSequencer};

pub use routes::{AppState, build_router};

impl AppState {
    /// Wire the relay components from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let verifier = TokenVerifier::new(config.token_secret.as_deref());
        if !verifier.is_configured() {
            warn!("Token secret is not configured; every join will be rejected");
        }
        if config.gateway.internal_secret.is_empty() {
            warn!("Chat store internal secret is empty");
        }

        let gateway = PersistenceGateway::new(&config.gateway)
            .map_err(|e| Error::Config(e.to_string()))?;

        let mut relay = ChatRelay::new(verifier, RoomRegistry::new(), gateway);
        if config.ordered_rooms {
            info!("Per-booking message ordering enabled");
            relay = relay.with_sequencer(RoomSequencer::default());
        }

        Ok(Self {
            relay: Arc::new(relay),
        })
    }
}

/// Bind the listener and serve until `shutdown` resolves.
pub async fn run(config: RelayConfig, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = build_router(state, config.cors.cors_layer());

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Error::Io)
}
