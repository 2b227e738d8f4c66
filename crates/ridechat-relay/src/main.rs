//! ridechat Relay Server
//!
//! WebSocket relay for booking-scoped passenger/driver chat.

use clap::Parser;
use tracing::info;

use ridechat_core::tracing_init::init_tracing;
use ridechat_relay::auth::token::now_secs;
use ridechat_relay::auth::{Claims, TokenVerifier};
use ridechat_relay::config::{Args, Command, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing("ridechat_relay=info,tower_http=info", args.log_json);

    if let Some(Command::MintToken {
        user_id,
        booking_id,
        ttl,
    }) = args.command
    {
        return mint_token(args.token_secret.as_deref(), user_id, booking_id, ttl);
    }

    let config = RelayConfig::from_args(&args)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        store = %config.gateway.base_url,
        "Starting ridechat-relay"
    );

    ridechat_relay::server::run(config, shutdown_signal()).await?;

    info!("Relay stopped");
    Ok(())
}

fn mint_token(
    secret: Option<&str>,
    user_id: i64,
    booking_id: i64,
    ttl: i64,
) -> anyhow::Result<()> {
    let verifier = TokenVerifier::new(secret);
    let exp = (ttl > 0).then(|| now_secs() + ttl);
    let token = verifier.sign(&Claims {
        user_id,
        booking_id,
        exp,
    })?;
    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
    }
}
