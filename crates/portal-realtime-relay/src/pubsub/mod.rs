//! Pub-sub subscription management.
//!
//! Tracks which connection listens to which `channel:EVENT` slot and routes
//! published row changes to the matching connections.

mod manager;
mod subscription;

pub use manager::PubSubManager;
pub use subscription::SubscriptionEntry;
