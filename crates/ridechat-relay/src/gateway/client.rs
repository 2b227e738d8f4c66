//! Persistence gateway HTTP client.
//!
//! Stores a chat message through `POST <base>/api/chat/store-internal` and
//! returns the canonical record the store assigned.

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::relay::error::STORE_FAILED;

/// Header carrying the shared internal secret.
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

const STORE_PATH: &str = "/api/chat/store-internal";

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat store error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("chat store response has no message")]
    MissingMessage,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Text shown to the sender in the failure ack.
    ///
    /// Non-success responses surface the store's own error text; anything
    /// else collapses to a generic message.
    pub fn client_message(&self) -> String {
        match self {
            Self::Api { body, .. } => error_text(body).unwrap_or_else(|| STORE_FAILED.to_string()),
            Self::Http(_) | Self::MissingMessage | Self::Config(_) => STORE_FAILED.to_string(),
        }
    }
}

/// Prefer a JSON `error`/`message` string, else the trimmed raw body.
fn error_text(body: &str) -> Option<String> {
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message"] {
            if let Some(Value::String(s)) = obj.get(key)
                && !s.is_empty()
            {
                return Some(s.clone());
            }
        }
    }
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Connection settings for the chat store.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Store base URL (e.g. `http://api.internal:8000`).
    pub base_url: String,
    /// Shared secret sent with every call.
    pub internal_secret: String,
}

/// Body of a store call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreMessageRequest {
    pub booking_id: i64,
    pub user_id: i64,
    pub message: String,
}

/// HTTP client for the chat store.
#[derive(Debug, Clone)]
pub struct PersistenceGateway {
    http: reqwest::Client,
    store_url: String,
}

impl PersistenceGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(GatewayError::Config("base_url is empty".into()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!(
                "base_url must be http(s): {base_url}"
            )));
        }

        let mut headers = HeaderMap::new();
        let secret = HeaderValue::from_str(&config.internal_secret)
            .map_err(|_| GatewayError::Config("Invalid internal secret format".into()))?;
        headers.insert(INTERNAL_SECRET_HEADER, secret);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            store_url: format!("{base_url}{STORE_PATH}"),
        })
    }

    pub fn store_url(&self) -> &str {
        &self.store_url
    }

    /// Persist a message and return the stored record.
    pub async fn store_message(&self, request: &StoreMessageRequest) -> Result<Value, GatewayError> {
        let resp = self.http.post(&self.store_url).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(
                status = status.as_u16(),
                booking_id = request.booking_id,
                "Chat store rejected message"
            );
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut body: Value = resp.json().await?;
        let message = body
            .get_mut("message")
            .map(Value::take)
            .filter(|m| !m.is_null())
            .ok_or(GatewayError::MissingMessage)?;
        debug!(booking_id = request.booking_id, "Chat message stored");
        Ok(message)
    }
}
