//! Error types for tether.

use thiserror::Error;

/// Errors surfaced by the client.
///
/// Transport failures after startup never reach callers: the connection
/// engine recovers from them by reconnecting. They appear here because the
/// [`crate::transport`] traits report them to the engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The endpoint URL could not be built.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Dialing, reading or writing the transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No live connection to send on.
    #[error("not connected")]
    NotConnected,

    /// Frame encoding or decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] tether_proto::ProtoError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
