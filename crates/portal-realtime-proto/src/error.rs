//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Unknown event type name.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Malformed row filter.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Malformed subscription key.
    #[error("invalid subscription key: {0}")]
    InvalidKey(String),
}
