//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not construct a socket.
    #[error("connection error: {0}")]
    Connection(String),

    /// A frame could not be handed to the socket.
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] portal_realtime_proto::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
