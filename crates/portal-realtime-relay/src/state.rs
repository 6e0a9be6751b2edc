use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::TokenVerifier;
use crate::config::RelayConfig;
use crate::pubsub::PubSubManager;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub pubsub: Arc<PubSubManager>,
    pub verifier: Option<Arc<TokenVerifier>>,
    pub config: RelayConfig,
    /// Bumped to make every open connection close.
    pub kicks: Arc<watch::Sender<u64>>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            pubsub: Arc::new(PubSubManager::new()),
            verifier: config
                .jwt_secret
                .as_deref()
                .map(|secret| Arc::new(TokenVerifier::with_secret_str(secret))),
            config,
            kicks: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Close every open connection with a restart code. New connections are
    /// still accepted.
    pub fn kick_all(&self) {
        self.kicks.send_modify(|generation| *generation += 1);
        tracing::info!(connections = self.pubsub.connection_count(), "dropping all clients");
    }
}
