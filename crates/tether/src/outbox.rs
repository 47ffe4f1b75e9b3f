//! Stable send handle over the per-connection outbound queue.
//!
//! Each transport gets a fresh bounded queue drained by its writer task. The
//! outbox is the long-lived handle topics and the engine send through: the
//! engine attaches the queue when a connection comes up and detaches it on
//! teardown.

use std::sync::Arc;

use parking_lot::RwLock;
use tether_proto::OutboundFrame;
use tokio::sync::mpsc;

use crate::error::ClientError;

/// Sender half of a connection's outbound queue.
pub type FrameSender = mpsc::Sender<String>;

/// Shared handle to the current outbound queue, if any.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    current: Arc<RwLock<Option<FrameSender>>>,
}

impl Outbox {
    /// Create a detached outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route frames to a new connection's queue.
    pub(crate) fn attach(&self, sender: FrameSender) {
        *self.current.write() = Some(sender);
    }

    /// Drop the current queue. The writer exits once every clone taken
    /// through [`Outbox::sender`] is gone too.
    pub(crate) fn detach(&self) {
        self.current.write().take();
    }

    /// Snapshot of the current queue.
    #[must_use]
    pub fn sender(&self) -> Option<FrameSender> {
        self.current.read().clone()
    }

    /// Encode and queue a frame on the current connection, waiting for
    /// queue space.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] if no queue is attached or its
    /// writer is gone, or a protocol error if the frame does not encode.
    pub async fn send(&self, frame: &OutboundFrame) -> Result<(), ClientError> {
        let sender = self.sender().ok_or(ClientError::NotConnected)?;
        send_frame(&sender, frame).await
    }
}

/// Encode and queue a frame on a specific connection.
pub(crate) async fn send_frame(
    sender: &FrameSender,
    frame: &OutboundFrame,
) -> Result<(), ClientError> {
    let json = frame.to_json()?;
    sender
        .send(json)
        .await
        .map_err(|_| ClientError::NotConnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_proto::Namespace;

    #[tokio::test]
    async fn test_send_without_connection() {
        let outbox = Outbox::new();
        let err = outbox
            .send(&OutboundFrame::ping(&Namespace::default()))
            .await
            .expect_err("should fail");
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_reaches_attached_queue() {
        let outbox = Outbox::new();
        let (tx, mut rx) = mpsc::channel(4);
        outbox.attach(tx);

        outbox
            .send(&OutboundFrame::pong(&Namespace::default()))
            .await
            .expect("send");

        assert_eq!(
            rx.recv().await.as_deref(),
            Some(r#"{"event":"pusher:pong","data":"{}"}"#)
        );
    }

    #[tokio::test]
    async fn test_detach_closes_queue() {
        let outbox = Outbox::new();
        let (tx, mut rx) = mpsc::channel(4);
        outbox.attach(tx);
        outbox.detach();

        assert!(outbox.sender().is_none());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let outbox = Outbox::new();
        let (tx, rx) = mpsc::channel(4);
        outbox.attach(tx);
        drop(rx);

        let result = outbox.send(&OutboundFrame::ping(&Namespace::default())).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }
}
