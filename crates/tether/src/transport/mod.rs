//! Transport capability.
//!
//! The engine treats the connection as an opaque duplex of text frames. A
//! [`Connector`] dials one, yielding a [`Transport`] whose halves are driven
//! by separate reader and writer tasks.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::Result;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod ws;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use ws::WsConnector;

/// Boxed future returned by the transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Dials new transports.
pub trait Connector: Send + Sync {
    /// Open a connection to `url`, failing if the handshake takes longer
    /// than `handshake_timeout`.
    fn connect<'a>(
        &'a self,
        url: &'a str,
        handshake_timeout: Duration,
    ) -> BoxFuture<'a, Result<Transport>>;
}

/// Receiving half of a transport.
pub trait FrameStream: Send {
    /// Wait for the next text frame. Any error ends the stream.
    fn receive(&mut self) -> BoxFuture<'_, Result<String>>;
}

/// Sending half of a transport.
pub trait FrameSink: Send {
    /// Send one text frame.
    fn send(&mut self, frame: String) -> BoxFuture<'_, Result<()>>;

    /// Close the connection.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// A dialed connection, split into halves.
pub struct Transport {
    /// Outbound half.
    pub sink: Box<dyn FrameSink>,
    /// Inbound half.
    pub stream: Box<dyn FrameStream>,
}

impl Transport {
    /// Pair up two halves.
    #[must_use]
    pub fn new(sink: Box<dyn FrameSink>, stream: Box<dyn FrameStream>) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}
