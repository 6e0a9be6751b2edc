//! Subscription tracking and delivery.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use portal_realtime_proto::{ChangeEvent, ClientMessage, EventType, SubscriptionKey};

/// Callback invoked for every change routed to a subscription.
pub type Callback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// A live subscription owned by the connection manager.
pub(crate) struct Subscription {
    pub(crate) key: SubscriptionKey,
    pub(crate) channel: String,
    pub(crate) event: EventType,
    pub(crate) filter: String,
    pub(crate) callback: Callback,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) events_delivered: u64,
}

impl Subscription {
    pub(crate) fn new(channel: &str, event: EventType, filter: &str, callback: Callback) -> Self {
        Self {
            key: SubscriptionKey::new(channel, event),
            channel: channel.to_string(),
            event,
            filter: filter.to_string(),
            callback,
            created_at: Utc::now(),
            events_delivered: 0,
        }
    }

    /// The subscribe request that registers this subscription server-side.
    pub(crate) fn request(&self) -> ClientMessage {
        ClientMessage::subscribe(self.channel.clone(), self.event, self.filter.clone())
    }

    pub(crate) fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            key: self.key.clone(),
            channel: self.channel.clone(),
            event: self.event,
            filter: self.filter.clone(),
            created_at: self.created_at,
            events_delivered: self.events_delivered,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("filter", &self.filter)
            .field("events_delivered", &self.events_delivered)
            .finish()
    }
}

/// Snapshot of one subscription, as reported by
/// [`ConnectionManager::subscriptions`](crate::ConnectionManager::subscriptions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// `channel:event` key the subscription is stored under.
    pub key: SubscriptionKey,
    /// Table the subscription listens on.
    pub channel: String,
    /// Change kind delivered to the callback.
    pub event: EventType,
    /// Row filter sent to the server, empty for none.
    pub filter: String,
    /// When the subscription was registered.
    pub created_at: DateTime<Utc>,
    /// Events handed to the callback so far.
    pub events_delivered: u64,
}

/// Invoke a callback, containing any panic it raises.
///
/// Returns `false` if the callback panicked.
pub(crate) fn deliver(key: &SubscriptionKey, callback: &Callback, event: ChangeEvent) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(event))) {
        Ok(()) => true,
        Err(panic) => {
            tracing::error!(
                key = %key,
                panic = %panic_message(&panic),
                "subscriber callback panicked"
            );
            false
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> ChangeEvent {
        ChangeEvent {
            event_type: EventType::Insert,
            schema: "public".to_string(),
            table: "projects".to_string(),
            record: json!({"id": "p1"}),
            old_record: None,
        }
    }

    #[test]
    fn test_subscription_request() {
        let sub = Subscription::new(
            "documents",
            EventType::Update,
            "project_id=eq.p1",
            Arc::new(|_| {}),
        );

        assert_eq!(sub.key.as_str(), "documents:UPDATE");
        assert_eq!(
            sub.request(),
            ClientMessage::subscribe("documents", EventType::Update, "project_id=eq.p1")
        );

        let info = sub.info();
        assert_eq!(info.filter, "project_id=eq.p1");
        assert_eq!(info.events_delivered, 0);
    }

    #[test]
    fn test_deliver_invokes_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: Callback = Arc::new(move |event: ChangeEvent| {
            assert_eq!(event.table, "projects");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let key = SubscriptionKey::new("projects", EventType::Insert);
        assert!(deliver(&key, &callback, event()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deliver_contains_panics() {
        let callback: Callback = Arc::new(|_| panic!("subscriber bug"));
        let key = SubscriptionKey::new("projects", EventType::Insert);
        assert!(!deliver(&key, &callback, event()));
    }
}
