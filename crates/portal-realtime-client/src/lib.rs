//! Portal Realtime Client - live row-change subscriptions over one WebSocket.
//!
//! A [`ConnectionManager`] keeps a single connection to the realtime service
//! alive, multiplexes any number of table subscriptions over it, re-sends
//! them after every reconnect and queues requests issued while offline.
//!
//! # Quick Start
//!
//! ```ignore
//! use portal_realtime_client::{ClientConfig, ConnectionManager, EventType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("wss://portal.example.com/realtime")
//!         .with_token(std::env::var("PORTAL_TOKEN")?);
//!     let manager = ConnectionManager::new(config)?;
//!
//!     // Subscriptions may be registered before connecting
//!     manager.on_new_projects(|event| println!("project created: {}", event.record));
//!     manager.on_document_changes("p1", EventType::Update, |event| {
//!         println!("document updated: {}", event.record);
//!     });
//!
//!     manager.connect().await;
//!     tokio::signal::ctrl_c().await?;
//!     manager.disconnect();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod portal;
pub mod queue;
pub mod subscription;
pub mod transport;
pub mod websocket;

pub use config::ClientConfig;
pub use connection::{ConnectionManager, ConnectionPhase, ConnectionState};
pub use error::Error;
pub use lifecycle::{lifecycle_channel, LifecycleSignal};
pub use subscription::{Callback, SubscriptionInfo};
pub use transport::{Endpoint, OutboundFrame, Socket, SocketEvent, SocketPeer, Transport};
pub use websocket::WebSocketTransport;

/// Re-export protocol types.
pub use portal_realtime_proto as proto;
pub use portal_realtime_proto::{ChangeEvent, EventType, SubscriptionKey};
