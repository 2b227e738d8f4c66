//! Relay configuration: command line flags with environment fallbacks.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use ridechat_core::{Error, Result};

use crate::gateway::GatewayConfig;

#[derive(Parser, Debug)]
#[command(name = "ridechat-relay")]
#[command(version, about = "ridechat relay server - booking chat over WebSocket")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Interface to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Base URL of the chat store API.
    #[arg(long, env = "CHAT_API_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub api_base_url: String,

    /// Shared secret sent to the chat store.
    #[arg(long, env = "CHAT_INTERNAL_SECRET", default_value = "", hide_env_values = true)]
    pub internal_secret: String,

    /// Token signing secret. Without it every token is rejected.
    #[arg(long, env = "CHAT_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Allowed browser origins, comma separated, or `*`.
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    pub cors_origins: String,

    /// Persist messages of a booking strictly one at a time, in arrival order.
    #[arg(long, env = "CHAT_ORDERED_ROOMS")]
    pub ordered_rooms: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a chat token signed with the configured secret (development aid).
    MintToken {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        booking_id: i64,
        /// Lifetime in seconds; 0 issues a token without expiry.
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },
}

/// Browser origins permitted by CORS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<HeaderValue>),
}

impl AllowedOrigins {
    pub fn parse(raw: &str) -> Result<Self> {
        let entries: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if entries.is_empty() || entries.contains(&"*") {
            return Ok(Self::Any);
        }

        entries
            .into_iter()
            .map(|origin| {
                let origin = origin.trim_end_matches('/');
                if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                    return Err(Error::Config(format!("invalid CORS origin: {origin}")));
                }
                HeaderValue::from_str(origin)
                    .map_err(|_| Error::Config(format!("invalid CORS origin: {origin}")))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::List)
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let origin = match self {
            Self::Any => AllowOrigin::from(Any),
            Self::List(origins) => AllowOrigin::list(origins.clone()),
        };
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Fully resolved relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub gateway: GatewayConfig,
    pub token_secret: Option<String>,
    pub cors: AllowedOrigins,
    pub ordered_rooms: bool,
}

impl RelayConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let api_base_url = args.api_base_url.trim();
        if api_base_url.is_empty() {
            return Err(Error::Config("chat store base URL is empty".into()));
        }

        Ok(Self {
            listen_addr: SocketAddr::new(args.host, args.port),
            gateway: GatewayConfig {
                base_url: api_base_url.to_string(),
                internal_secret: args.internal_secret.clone(),
            },
            token_secret: args.token_secret.clone().filter(|s| !s.is_empty()),
            cors: AllowedOrigins::parse(&args.cors_origins)?,
            ordered_rooms: args.ordered_rooms,
        })
    }
}
