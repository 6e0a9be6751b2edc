//! Host lifecycle signals.
//!
//! A UI shell knows when the app is hidden or the network drops; the manager
//! does not. Hosts forward those transitions as [`LifecycleSignal`]s, either
//! one at a time through [`ConnectionManager::handle_signal`] or as a stream
//! through [`ConnectionManager::watch_lifecycle`].

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{spawn_signal_pump, ConnectionManager};

/// A change in the host environment that affects the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    /// The app went to the background.
    VisibilityLost,
    /// The app came back to the foreground.
    VisibilityRegained,
    /// The host lost network connectivity.
    NetworkLost,
    /// The host regained network connectivity.
    NetworkRegained,
}

impl LifecycleSignal {
    /// Whether the signal means the connection should be up.
    pub fn wants_connection(self) -> bool {
        matches!(self, Self::VisibilityRegained | Self::NetworkRegained)
    }
}

/// Create a channel for feeding signals to [`ConnectionManager::watch_lifecycle`].
pub fn lifecycle_channel() -> (
    mpsc::UnboundedSender<LifecycleSignal>,
    mpsc::UnboundedReceiver<LifecycleSignal>,
) {
    mpsc::unbounded_channel()
}

impl ConnectionManager {
    /// Apply one lifecycle signal.
    ///
    /// Losing visibility or the network disconnects cleanly, so no reconnect
    /// is scheduled while the host cannot use the connection. Regaining
    /// either connects again.
    pub async fn handle_signal(&self, signal: LifecycleSignal) {
        tracing::debug!(?signal, "lifecycle signal");
        if signal.wants_connection() {
            if !self.connect().await {
                tracing::warn!(?signal, "connect after lifecycle signal failed");
            }
        } else {
            self.disconnect();
        }
    }

    /// Apply every signal received on `signals` until the sender is dropped
    /// or the manager goes away.
    ///
    /// The returned task holds only a weak reference to the manager.
    pub fn watch_lifecycle(&self, signals: mpsc::UnboundedReceiver<LifecycleSignal>) -> JoinHandle<()> {
        spawn_signal_pump(self.downgrade(), signals)
    }
}
