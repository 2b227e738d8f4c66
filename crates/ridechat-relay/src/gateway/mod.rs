//! Client for the external chat store that owns message persistence.

pub mod client;

pub use client::{GatewayConfig, GatewayError, PersistenceGateway, StoreMessageRequest};
