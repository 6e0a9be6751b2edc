//! Subscription tracking and filtering.

use std::time::Instant;

use portal_realtime_proto::{ChangeEvent, EqFilter, EventType, SubscriptionKey};
use uuid::Uuid;

/// A subscription entry tracking an active subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    /// Connection that owns the subscription.
    pub connection_id: Uuid,
    /// `channel:EVENT` slot.
    pub key: SubscriptionKey,
    /// Table being watched.
    pub channel: String,
    /// Event type being watched.
    pub event: EventType,
    /// Optional row filter.
    pub filter: Option<EqFilter>,
    /// When the subscription was created.
    pub created_at: Instant,
    /// Number of events sent to this subscription.
    pub events_sent: u64,
}

impl SubscriptionEntry {
    /// Create a new subscription entry.
    pub fn new(
        connection_id: Uuid,
        channel: impl Into<String>,
        event: EventType,
        filter: Option<EqFilter>,
    ) -> Self {
        let channel = channel.into();
        Self {
            connection_id,
            key: SubscriptionKey::new(&channel, event),
            channel,
            event,
            filter,
            created_at: Instant::now(),
            events_sent: 0,
        }
    }

    /// Check whether a change should be delivered to this subscription.
    ///
    /// Filters match against the new row, or the old row when the new one
    /// does not carry the column (deletes).
    pub fn matches(&self, change: &ChangeEvent) -> bool {
        if change.table != self.channel || change.event_type != self.event {
            return false;
        }

        match &self.filter {
            None => true,
            Some(filter) => {
                filter.matches(&change.record)
                    || change
                        .old_record
                        .as_ref()
                        .map(|old| filter.matches(old))
                        .unwrap_or(false)
            }
        }
    }

    /// Get the age of this subscription.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }
}
