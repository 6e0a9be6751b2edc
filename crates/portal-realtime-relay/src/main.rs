use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portal_realtime_relay::{
    config::{Args, RelayConfig},
    Relay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let log_filter = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("portal_realtime_relay={},tower_http=info", log_filter).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config: RelayConfig = args.into();
    if config.jwt_secret.is_none() {
        tracing::warn!("no JWT secret configured; accepting anonymous clients");
    }

    let relay = Relay::bind(config).await?;
    let base_url = format!("http://{}", relay.local_addr());

    tracing::info!("Realtime endpoint at {}", relay.ws_url());
    tracing::info!("Publish changes with POST {}/publish", base_url);
    tracing::info!("Health check at {}/health", base_url);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    relay.shutdown();

    Ok(())
}
