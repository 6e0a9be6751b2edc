//! Wire messages.
//!
//! Every frame is a JSON object tagged by `type`. The client sends
//! [`ClientMessage`] frames and the server answers with [`ServerMessage`]
//! frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::event::{ChangeEvent, EventType, SubscriptionKey, DEFAULT_SCHEMA};

/// WebSocket close code for an intentional shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code used when the client gives up on a silent server.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// Whether a close code means the peer shut down on purpose.
pub fn is_clean_close(code: u16) -> bool {
    code == CLOSE_NORMAL
}

/// Frames sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Keepalive.
    Heartbeat,
    /// Start receiving changes for `channel:event`.
    Subscription {
        channel: String,
        event: EventType,
        #[serde(default)]
        filter: String,
    },
    /// Stop receiving changes for `channel:event`.
    Unsubscription { channel: String, event: EventType },
}

impl ClientMessage {
    /// Create a subscribe request.
    pub fn subscribe(channel: impl Into<String>, event: EventType, filter: impl Into<String>) -> Self {
        ClientMessage::Subscription {
            channel: channel.into(),
            event,
            filter: filter.into(),
        }
    }

    /// Create an unsubscribe request.
    pub fn unsubscribe(channel: impl Into<String>, event: EventType) -> Self {
        ClientMessage::Unsubscription {
            channel: channel.into(),
            event,
        }
    }

    /// Subscription key this request refers to, if any.
    pub fn key(&self) -> Option<SubscriptionKey> {
        match self {
            ClientMessage::Heartbeat => None,
            ClientMessage::Subscription { channel, event, .. }
            | ClientMessage::Unsubscription { channel, event } => {
                Some(SubscriptionKey::new(channel, *event))
            }
        }
    }

    /// Whether this is a subscribe request.
    pub fn is_subscribe(&self) -> bool {
        matches!(self, ClientMessage::Subscription { .. })
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Frames sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Keepalive answer.
    Heartbeat,
    /// A row change pushed for an active subscription.
    Subscription {
        channel: String,
        event: EventType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        #[serde(default)]
        record: Value,
        #[serde(default)]
        old_record: Option<Value>,
    },
    /// A server-side error report.
    Error { error: String },
}

impl ServerMessage {
    /// Create a row-change push.
    pub fn change(
        channel: impl Into<String>,
        event: EventType,
        record: Value,
        old_record: Option<Value>,
    ) -> Self {
        ServerMessage::Subscription {
            channel: channel.into(),
            event,
            schema: None,
            record,
            old_record,
        }
    }

    /// Create an error report.
    pub fn error(error: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
        }
    }

    /// Turn a row-change push into the event handed to callbacks.
    pub fn into_change_event(self) -> Option<ChangeEvent> {
        match self {
            ServerMessage::Subscription {
                channel,
                event,
                schema,
                record,
                old_record,
            } => Some(ChangeEvent {
                event_type: event,
                schema: schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
                table: channel,
                record,
                old_record: old_record.filter(|old| !old.is_null()),
            }),
            _ => None,
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Decode a JSON text frame.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
