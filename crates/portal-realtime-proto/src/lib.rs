//! Portal realtime protocol types.
//!
//! This crate defines the JSON wire protocol spoken between the realtime
//! client and the event source, plus the row-change types handed to
//! subscribers.
//!
//! # Modules
//!
//! - [`message`] - Client and server frames, close codes
//! - [`event`] - Event types, change events, subscription keys
//! - [`filter`] - Equality row filters (`column=eq.value`)
//! - [`error`] - Protocol error types
//!
//! # Example
//!
//! ```
//! use portal_realtime_proto::{ClientMessage, EventType, ServerMessage};
//!
//! let frame = ClientMessage::subscribe("projects", EventType::Insert, "").to_json().unwrap();
//! assert!(frame.contains("\"type\":\"subscription\""));
//!
//! let push = ServerMessage::from_json(
//!     r#"{"type":"subscription","channel":"projects","event":"INSERT","record":{"id":"p1"}}"#,
//! )
//! .unwrap();
//! let event = push.into_change_event().unwrap();
//! assert_eq!(event.table, "projects");
//! ```

pub mod error;
pub mod event;
pub mod filter;
pub mod message;

pub use error::Error;

// Re-export commonly used types at crate root
pub use event::{ChangeEvent, EventType, SubscriptionKey, DEFAULT_SCHEMA};
pub use filter::EqFilter;
pub use message::{
    is_clean_close, ClientMessage, ServerMessage, CLOSE_ABNORMAL, CLOSE_HEARTBEAT_TIMEOUT,
    CLOSE_NORMAL,
};
