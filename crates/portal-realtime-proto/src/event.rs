//! Row-change events and subscription keys.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Schema reported when the server does not name one.
pub const DEFAULT_SCHEMA: &str = "public";

/// Kind of row change a subscription listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl EventType {
    /// Wire name of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "INSERT",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(EventType::Insert),
            "UPDATE" => Ok(EventType::Update),
            "DELETE" => Ok(EventType::Delete),
            _ => Err(Error::UnknownEventType(s.to_string())),
        }
    }
}

/// Identifies one logical subscription slot: `channel:event`.
///
/// A channel holds at most one subscription per event type, so the key is
/// also what a caller hands back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    /// Build the key for a channel and event type.
    pub fn new(channel: &str, event: EventType) -> Self {
        Self(format!("{}:{}", channel, event))
    }

    /// Parse a `channel:event` string.
    pub fn parse(key: &str) -> Result<Self, Error> {
        let (channel, event) = key
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidKey(key.to_string()))?;
        if channel.is_empty() {
            return Err(Error::InvalidKey(key.to_string()));
        }
        let event = event
            .parse::<EventType>()
            .map_err(|_| Error::InvalidKey(key.to_string()))?;
        Ok(Self::new(channel, event))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The channel component.
    pub fn channel(&self) -> &str {
        self.0.rsplit_once(':').map(|(c, _)| c).unwrap_or(&self.0)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SubscriptionKey> for String {
    fn from(key: SubscriptionKey) -> Self {
        key.0
    }
}

impl AsRef<str> for SubscriptionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A row change delivered to a subscription callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T = Value> {
    /// What happened to the row.
    pub event_type: EventType,
    /// Schema the table lives in.
    pub schema: String,
    /// Table (channel) the row belongs to.
    pub table: String,
    /// New or current row.
    pub record: T,
    /// Previous row, present for updates and deletes when the server sends it.
    pub old_record: Option<T>,
}

impl ChangeEvent<Value> {
    /// Deserialize the row payloads into a concrete type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<ChangeEvent<T>, Error> {
        let record = serde_json::from_value(self.record)
            .map_err(|e| Error::Deserialization(format!("record: {}", e)))?;
        let old_record = match self.old_record {
            Some(Value::Null) | None => None,
            Some(old) => Some(
                serde_json::from_value(old)
                    .map_err(|e| Error::Deserialization(format!("old_record: {}", e)))?,
            ),
        };

        Ok(ChangeEvent {
            event_type: self.event_type,
            schema: self.schema,
            table: self.table,
            record,
            old_record,
        })
    }

    /// Look up a column on the current row, falling back to the previous row.
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.record
            .get(name)
            .or_else(|| self.old_record.as_ref().and_then(|old| old.get(name)))
    }
}

impl<T> ChangeEvent<T> {
    /// Subscription key this event is routed by.
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.table, self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(serde_json::to_string(&EventType::Insert).unwrap(), "\"INSERT\"");
        assert_eq!("update".parse::<EventType>().unwrap(), EventType::Update);
        assert!("UPSERT".parse::<EventType>().is_err());
    }

    #[test]
    fn test_subscription_key() {
        let key = SubscriptionKey::new("documents", EventType::Update);
        assert_eq!(key.as_str(), "documents:UPDATE");
        assert_eq!(key.channel(), "documents");
        assert_eq!(SubscriptionKey::parse("documents:UPDATE").unwrap(), key);
    }

    #[test]
    fn test_subscription_key_rejects_garbage() {
        assert!(SubscriptionKey::parse("documents").is_err());
        assert!(SubscriptionKey::parse(":INSERT").is_err());
        assert!(SubscriptionKey::parse("documents:TRUNCATE").is_err());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Message {
        id: String,
        body: String,
    }

    #[test]
    fn test_into_typed() {
        let event = ChangeEvent {
            event_type: EventType::Insert,
            schema: DEFAULT_SCHEMA.to_string(),
            table: "messages".to_string(),
            record: json!({"id": "m1", "body": "hello"}),
            old_record: Some(Value::Null),
        };

        let typed: ChangeEvent<Message> = event.into_typed().unwrap();
        assert_eq!(typed.record.id, "m1");
        assert!(typed.old_record.is_none());
        assert_eq!(typed.key().as_str(), "messages:INSERT");
    }

    #[test]
    fn test_column_falls_back_to_old_record() {
        let event = ChangeEvent {
            event_type: EventType::Delete,
            schema: DEFAULT_SCHEMA.to_string(),
            table: "documents".to_string(),
            record: json!({}),
            old_record: Some(json!({"project_id": "p1"})),
        };

        assert_eq!(event.column("project_id"), Some(&json!("p1")));
        assert_eq!(event.column("missing"), None);
    }
}
