//! Portal Realtime Command-Line Subscriber
//!
//! Connects to the realtime service, subscribes to the given tables and
//! prints every change until interrupted.

mod formatter;
mod target;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use formatter::OutputFormat;
use portal_realtime_client::config::DEFAULT_URL;
use portal_realtime_client::{ChangeEvent, ClientConfig, ConnectionManager, ConnectionPhase};
use target::Target;
use tokio::sync::mpsc;

/// Portal Realtime Command-Line Subscriber
#[derive(Parser, Debug)]
#[command(name = "portal-realtime")]
#[command(version, about = "Print live row changes from the portal realtime service")]
pub struct Args {
    /// Realtime WebSocket URL
    #[arg(short, long, env = "PORTAL_REALTIME_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Bearer token presented on connect
    #[arg(short, long, env = "PORTAL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Subscription as table:EVENT[:filter], e.g. documents:UPDATE:project_id=eq.p1
    #[arg(short, long = "subscribe", required = true)]
    pub subscribe: Vec<Target>,

    /// Output format
    #[arg(long, default_value = "json", value_enum)]
    pub format: OutputFormat,

    /// Heartbeat interval in seconds
    #[arg(long, default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Reconnect when the server has been silent this many seconds
    #[arg(long)]
    pub heartbeat_timeout_secs: Option<u64>,

    /// Abnormal closes tolerated before giving up
    #[arg(long, default_value_t = 5)]
    pub max_reconnect_attempts: u32,
}

impl From<&Args> for ClientConfig {
    fn from(args: &Args) -> Self {
        let mut config = ClientConfig::new(&args.url)
            .with_heartbeat_interval(Duration::from_secs(args.heartbeat_secs))
            .with_max_reconnect_attempts(args.max_reconnect_attempts);
        if let Some(token) = &args.token {
            config = config.with_token(token);
        }
        if let Some(secs) = args.heartbeat_timeout_secs {
            config = config.with_heartbeat_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_realtime=info,portal_realtime_client=info".into()),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let manager = ConnectionManager::new(ClientConfig::from(&args))?;

    let (tx, mut events) = mpsc::unbounded_channel::<ChangeEvent>();
    let forward = Arc::new(move |event: ChangeEvent| {
        let _ = tx.send(event);
    });
    for target in &args.subscribe {
        let key =
            manager.subscribe_callback(&target.table, target.event, &target.filter, forward.clone());
        tracing::info!(key = %key, filter = %target.filter, "subscribed");
    }

    let mut states = manager.watch_state();
    if !manager.connect().await {
        tracing::warn!(url = %args.url, "initial connect failed; retrying in the background");
    }

    let max_attempts = args.max_reconnect_attempts;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                println!("{}", formatter::format_event(args.format, &event, chrono::Utc::now()));
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                tracing::debug!(
                    phase = ?state.phase,
                    attempts = state.reconnect_attempts,
                    "connection state"
                );
                if state.phase == ConnectionPhase::Disconnected
                    && state.reconnect_attempts >= max_attempts
                {
                    manager.disconnect();
                    return Err(format!(
                        "gave up after {} reconnect attempts",
                        state.reconnect_attempts
                    )
                    .into());
                }
            }
            _ = &mut shutdown => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    manager.disconnect();
    Ok(())
}
