//! # tether-proto
//!
//! Wire envelope and control payload definitions for the tether realtime
//! pub/sub client.
//!
//! Every frame on the wire is a JSON object of the shape
//! `{"event": "...", "channel": "...", "data": ...}` where `data` is either a
//! string or a nested JSON value. [`Event`] is the normalized, immutable form
//! handed to the rest of the client: its payload is always a string.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod control;
pub mod error;
pub mod event;

pub use control::{
    ConnectionEstablished, ControlEvent, DEFAULT_NAMESPACE, ErrorData, Namespace, OutboundFrame,
    SubscribeData,
};
pub use error::ProtoError;
pub use event::{normalize_payload, Event};

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
