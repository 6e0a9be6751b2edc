//! Portal Realtime Relay - a development event source for realtime clients.
//!
//! This crate serves the realtime protocol over WebSocket so the client can
//! be run and tested without the hosted service:
//! - `/realtime` WebSocket endpoint with optional JWT verification
//! - Per-connection subscriptions with equality row filters
//! - `POST /publish` and [`Relay::publish`] to inject row changes
//! - `/health` status route

pub mod auth;
pub mod config;
pub mod error;
pub mod pubsub;
pub mod routes;
pub mod state;
pub mod ws;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use portal_realtime_proto::ChangeEvent;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::state::AppState;

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .merge(routes::health::routes())
        // Change injection
        .merge(routes::publish::routes())
        // Realtime WebSocket
        .route("/realtime", get(ws::ws_realtime))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// A relay serving on a bound socket.
///
/// The server task stops when the relay is dropped.
pub struct Relay {
    addr: SocketAddr,
    state: AppState,
    task: JoinHandle<()>,
}

impl Relay {
    /// Bind the listener and start serving.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let addr = listener.local_addr()?;
        let state = AppState::new(config);
        let app = create_router(state.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "relay server stopped");
            }
        });

        tracing::info!(%addr, auth = state.verifier.is_some(), "relay listening");
        Ok(Self { addr, state, task })
    }

    /// Address the relay is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL clients should connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/realtime", self.addr)
    }

    /// Shared state, for inspecting connections and subscriptions.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Route a change to subscribed clients. Returns the number of
    /// connections it was written to.
    pub async fn publish(&self, change: &ChangeEvent) -> usize {
        self.state.pubsub.publish(change).await
    }

    /// Close every client connection abnormally, as a restart would.
    pub fn kick_all(&self) {
        self.state.kick_all();
    }

    /// Stop accepting connections and drop the current ones.
    pub fn shutdown(self) {
        self.state.kick_all();
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}
