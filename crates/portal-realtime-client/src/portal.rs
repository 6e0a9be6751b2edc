//! Convenience subscriptions.
//!
//! Thin wrappers over [`ConnectionManager::subscribe`]: per-event helpers,
//! channel-backed and typed subscriptions, and shortcuts for the portal's
//! own tables.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use portal_realtime_proto::filter::eq;
use portal_realtime_proto::{ChangeEvent, EventType, SubscriptionKey};

use crate::connection::ConnectionManager;

/// Projects table.
pub const PROJECTS: &str = "projects";
/// Documents table.
pub const DOCUMENTS: &str = "documents";
/// Messages table.
pub const MESSAGES: &str = "messages";

impl ConnectionManager {
    /// Subscribe to inserts on `table`.
    pub fn on_insert<F>(&self, table: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(table, EventType::Insert, "", callback)
    }

    /// Subscribe to updates on `table`.
    pub fn on_update<F>(&self, table: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(table, EventType::Update, "", callback)
    }

    /// Subscribe to deletes on `table`.
    pub fn on_delete<F>(&self, table: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(table, EventType::Delete, "", callback)
    }

    /// Subscribe to updates of the single row `id` in `table`.
    ///
    /// Shares the `table:UPDATE` slot with [`on_update`](Self::on_update), so
    /// the later of the two wins.
    pub fn on_row_update<F>(&self, table: &str, id: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(table, EventType::Update, &eq("id", id), callback)
    }

    /// Subscribe and receive events on a channel instead of a callback.
    ///
    /// The receiver yields events until the subscription is removed or the
    /// manager is dropped. Events for a dropped receiver are discarded.
    pub fn subscribe_channel(
        &self,
        channel: &str,
        event: EventType,
        filter: &str,
    ) -> (SubscriptionKey, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = self.subscribe(channel, event, filter, move |change| {
            if tx.send(change).is_err() {
                tracing::trace!("subscription receiver dropped");
            }
        });
        (key, rx)
    }

    /// Subscribe with records decoded into `T`.
    ///
    /// Events whose `record` does not decode are logged and skipped.
    pub fn subscribe_typed<T, F>(&self, channel: &str, event: EventType, filter: &str, callback: F) -> SubscriptionKey
    where
        T: DeserializeOwned + 'static,
        F: Fn(ChangeEvent<T>) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        self.subscribe(channel, event, filter, move |change| {
            let key = change.key();
            match change.into_typed::<T>() {
                Ok(typed) => callback(typed),
                Err(e) => tracing::warn!(key = %key, error = %e, "record did not decode"),
            }
        })
    }

    /// New projects.
    pub fn on_new_projects<F>(&self, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.on_insert(PROJECTS, callback)
    }

    /// Updates to one project.
    pub fn on_project_changes<F>(&self, project_id: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.on_row_update(PROJECTS, project_id, callback)
    }

    /// Document changes within one project.
    pub fn on_document_changes<F>(&self, project_id: &str, event: EventType, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(DOCUMENTS, event, &eq("project_id", project_id), callback)
    }

    /// New messages within one project.
    pub fn on_project_messages<F>(&self, project_id: &str, callback: F) -> SubscriptionKey
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(MESSAGES, EventType::Insert, &eq("project_id", project_id), callback)
    }
}
