//! Pub-sub manager for routing row changes to connected clients.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use portal_realtime_proto::{ChangeEvent, EqFilter, EventType, ServerMessage, SubscriptionKey};

use super::subscription::SubscriptionEntry;
use crate::error::RelayError;

type EntryId = (Uuid, SubscriptionKey);

/// Manager for realtime subscriptions and change routing.
///
/// Each connection registers an outbound sender; published changes are turned
/// into `subscription` pushes and written to every connection whose
/// subscription matches.
#[derive(Default)]
pub struct PubSubManager {
    /// Outbound frame senders keyed by connection.
    connections: DashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>,
    /// Active subscriptions keyed by connection and slot.
    subscriptions: RwLock<HashMap<EntryId, SubscriptionEntry>>,
    /// Index of subscriptions by channel.
    channel_index: RwLock<HashMap<String, Vec<EntryId>>>,
}

impl PubSubManager {
    /// Create a new pub-sub manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel.
    pub fn register(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<ServerMessage>) {
        self.connections.insert(connection_id, sender);
        tracing::debug!(%connection_id, "connection registered");
    }

    /// Subscribe a connection to a channel and event.
    ///
    /// A second subscribe for the same slot on the same connection replaces
    /// the first.
    pub async fn subscribe(
        &self,
        connection_id: Uuid,
        channel: &str,
        event: EventType,
        filter: &str,
    ) -> Result<SubscriptionKey, RelayError> {
        let filter = EqFilter::parse(filter)?;
        let entry = SubscriptionEntry::new(connection_id, channel, event, filter);
        let key = entry.key.clone();
        let id = (connection_id, key.clone());

        let replaced = {
            let mut subs = self.subscriptions.write().await;
            subs.insert(id.clone(), entry).is_some()
        };

        if !replaced {
            let mut index = self.channel_index.write().await;
            index.entry(channel.to_string()).or_default().push(id);
        }

        tracing::debug!(
            %connection_id,
            key = %key,
            replaced,
            "subscription created"
        );

        Ok(key)
    }

    /// Remove one subscription. Returns whether it existed.
    pub async fn unsubscribe(&self, connection_id: Uuid, key: &SubscriptionKey) -> bool {
        let id = (connection_id, key.clone());
        let entry = {
            let mut subs = self.subscriptions.write().await;
            subs.remove(&id)
        };

        let Some(entry) = entry else {
            return false;
        };

        self.unindex(&entry.channel, &id).await;

        tracing::debug!(
            %connection_id,
            key = %key,
            events_sent = entry.events_sent,
            "subscription removed"
        );
        true
    }

    /// Forget a connection and all of its subscriptions.
    ///
    /// Returns the number of subscriptions removed.
    pub async fn remove_connection(&self, connection_id: Uuid) -> usize {
        self.connections.remove(&connection_id);

        let removed: Vec<SubscriptionEntry> = {
            let mut subs = self.subscriptions.write().await;
            let ids: Vec<EntryId> = subs
                .keys()
                .filter(|(owner, _)| *owner == connection_id)
                .cloned()
                .collect();
            ids.iter().filter_map(|id| subs.remove(id)).collect()
        };

        for entry in &removed {
            self.unindex(&entry.channel, &(connection_id, entry.key.clone()))
                .await;
        }

        tracing::debug!(
            %connection_id,
            subscriptions = removed.len(),
            "connection removed"
        );
        removed.len()
    }

    /// Route a change to every matching subscription.
    ///
    /// Returns the number of connections the change was written to.
    pub async fn publish(&self, change: &ChangeEvent) -> usize {
        let ids = {
            let index = self.channel_index.read().await;
            match index.get(&change.table) {
                Some(ids) => ids.clone(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut subs = self.subscriptions.write().await;
        for id in ids {
            let Some(entry) = subs.get_mut(&id) else {
                continue;
            };
            if !entry.matches(change) {
                continue;
            }

            let Some(sender) = self.connections.get(&entry.connection_id) else {
                continue;
            };
            let push = ServerMessage::Subscription {
                channel: change.table.clone(),
                event: change.event_type,
                schema: Some(change.schema.clone()),
                record: change.record.clone(),
                old_record: change.old_record.clone(),
            };
            if sender.send(push).is_ok() {
                entry.events_sent += 1;
                delivered += 1;
            }
        }

        tracing::trace!(
            table = %change.table,
            event = %change.event_type,
            delivered,
            "published change"
        );
        delivered
    }

    /// Get the number of connected clients.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of active subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Get the subscription keys held by one connection.
    pub async fn subscriptions_for_connection(&self, connection_id: Uuid) -> Vec<SubscriptionKey> {
        let subs = self.subscriptions.read().await;
        let mut keys: Vec<SubscriptionKey> = subs
            .keys()
            .filter(|(owner, _)| *owner == connection_id)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    async fn unindex(&self, channel: &str, id: &EntryId) {
        let mut index = self.channel_index.write().await;
        if let Some(ids) = index.get_mut(channel) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                index.remove(channel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(table: &str, record: serde_json::Value) -> ChangeEvent {
        ChangeEvent {
            event_type: EventType::Insert,
            schema: "public".to_string(),
            table: table.to_string(),
            record,
            old_record: None,
        }
    }

    fn connect(manager: &PubSubManager) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.register(id, tx);
        (id, rx)
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let manager = PubSubManager::new();
        let (id, mut rx) = connect(&manager);

        let key = manager
            .subscribe(id, "projects", EventType::Insert, "")
            .await
            .unwrap();
        assert_eq!(key.as_str(), "projects:INSERT");
        assert_eq!(manager.subscription_count().await, 1);

        let delivered = manager.publish(&insert("projects", json!({"id": "p1"}))).await;
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            ServerMessage::Subscription { channel, record, schema, .. } => {
                assert_eq!(channel, "projects");
                assert_eq!(record["id"], "p1");
                assert_eq!(schema.as_deref(), Some("public"));
            }
            other => panic!("unexpected push: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_filter_limits_delivery() {
        let manager = PubSubManager::new();
        let (first, _rx1) = connect(&manager);
        let (second, _rx2) = connect(&manager);

        manager
            .subscribe(first, "messages", EventType::Insert, "project_id=eq.p1")
            .await
            .unwrap();
        manager
            .subscribe(second, "messages", EventType::Insert, "project_id=eq.p2")
            .await
            .unwrap();

        let delivered = manager
            .publish(&insert("messages", json!({"id": "m1", "project_id": "p1"})))
            .await;
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_invalid_filter_rejected() {
        let manager = PubSubManager::new();
        let (id, _rx) = connect(&manager);

        let result = manager
            .subscribe(id, "messages", EventType::Insert, "project_id>p1")
            .await;
        assert!(matches!(result, Err(RelayError::Protocol(_))));
        assert_eq!(manager.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces() {
        let manager = PubSubManager::new();
        let (id, _rx) = connect(&manager);

        manager.subscribe(id, "projects", EventType::Insert, "").await.unwrap();
        manager.subscribe(id, "projects", EventType::Insert, "").await.unwrap();
        assert_eq!(manager.subscription_count().await, 1);

        let delivered = manager.publish(&insert("projects", json!({"id": "p1"}))).await;
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_remove_connection() {
        let manager = PubSubManager::new();
        let (id, _rx) = connect(&manager);

        let key = manager.subscribe(id, "projects", EventType::Insert, "").await.unwrap();
        manager.subscribe(id, "documents", EventType::Update, "").await.unwrap();

        assert!(manager.unsubscribe(id, &key).await);
        assert!(!manager.unsubscribe(id, &key).await);
        assert_eq!(
            manager.subscriptions_for_connection(id).await,
            vec![SubscriptionKey::new("documents", EventType::Update)]
        );

        assert_eq!(manager.remove_connection(id).await, 1);
        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.subscription_count().await, 0);
        assert_eq!(manager.publish(&insert("projects", json!({}))).await, 0);
    }
}
