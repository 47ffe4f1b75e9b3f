//! In-process transport.
//!
//! [`MemoryConnector`] hands every successful dial to a [`MemoryListener`],
//! which yields the server side of the connection as a [`MemoryPeer`]. Dials
//! can be made to fail or stall, and writes can be frozen, to exercise
//! reconnection and backpressure.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{BoxFuture, Connector, FrameSink, FrameStream, Transport};
use crate::error::{ClientError, Result};

#[derive(Debug)]
struct Shared {
    accept: mpsc::UnboundedSender<MemoryPeer>,
    attempts: AtomicUsize,
    refuse: AtomicUsize,
    stall: AtomicUsize,
    frozen: AtomicBool,
    urls: Mutex<Vec<String>>,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Client side dialer of the in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Create a connector and the listener receiving its connections.
    #[must_use]
    pub fn pair() -> (Self, MemoryListener) {
        let (accept, incoming) = mpsc::unbounded_channel();
        let connector = Self {
            shared: Arc::new(Shared {
                accept,
                attempts: AtomicUsize::new(0),
                refuse: AtomicUsize::new(0),
                stall: AtomicUsize::new(0),
                frozen: AtomicBool::new(false),
                urls: Mutex::new(Vec::new()),
            }),
        };
        (connector, MemoryListener { incoming })
    }

    /// Fail the next `count` dials immediately.
    pub fn refuse_next(&self, count: usize) {
        self.shared.refuse.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` dials hang until the handshake timeout.
    pub fn stall_next(&self, count: usize) {
        self.shared.stall.store(count, Ordering::SeqCst);
    }

    /// Make every connection dialed from now on accept no writes: sends on
    /// its sink never complete, as with a peer that stopped reading.
    pub fn freeze_writes(&self) {
        self.shared.frozen.store(true, Ordering::SeqCst);
    }

    /// Number of dials attempted so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// URLs dialed so far, in order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.shared.urls.lock().clone()
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        url: &'a str,
        handshake_timeout: Duration,
    ) -> BoxFuture<'a, Result<Transport>> {
        Box::pin(async move {
            self.shared.attempts.fetch_add(1, Ordering::SeqCst);
            self.shared.urls.lock().push(url.to_owned());

            if take_one(&self.shared.refuse) {
                return Err(ClientError::Transport("connection refused".to_string()));
            }
            if take_one(&self.shared.stall) {
                tokio::time::sleep(handshake_timeout).await;
                return Err(ClientError::Transport("handshake timed out".to_string()));
            }

            let (to_client, from_peer) = mpsc::unbounded_channel();
            let (to_peer, from_client) = mpsc::unbounded_channel();
            let peer = MemoryPeer {
                outgoing: Some(to_client),
                incoming: from_client,
            };
            self.shared
                .accept
                .send(peer)
                .map_err(|_| ClientError::Transport("listener is gone".to_string()))?;

            Ok(Transport::new(
                Box::new(MemorySink {
                    tx: Some(to_peer),
                    frozen: self.shared.frozen.load(Ordering::SeqCst),
                }),
                Box::new(MemoryStream { rx: from_peer }),
            ))
        })
    }
}

/// Receives the server side of each connection a [`MemoryConnector`] dials.
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }
}

/// Server side of one in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Send a raw text frame to the client. Returns `false` if the client
    /// side is gone or the peer was closed.
    pub fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.outgoing
            .as_ref()
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Send a JSON frame to the client.
    pub fn send_json(&self, frame: &Value) -> bool {
        self.send_raw(frame.to_string())
    }

    /// Send `{"event": event, "channel": channel, "data": data}`, omitting
    /// the channel when empty.
    pub fn send_event(&self, event: &str, channel: &str, data: Value) -> bool {
        let mut frame = serde_json::json!({ "event": event, "data": data });
        if !channel.is_empty() {
            frame["channel"] = Value::String(channel.to_owned());
        }
        self.send_json(&frame)
    }

    /// Next frame the client sent, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Next frame the client sent, decoded as JSON. Undecodable frames yield
    /// `Value::Null`.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let frame = self.recv().await?;
        Some(serde_json::from_str(&frame).unwrap_or(Value::Null))
    }

    /// Frames already sent by the client, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.incoming.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drop the connection from the server side. The client observes the
    /// end of its stream.
    pub fn close(&mut self) {
        self.outgoing.take();
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
    frozen: bool,
}

impl FrameSink for MemorySink {
    fn send(&mut self, frame: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.frozen {
                std::future::pending::<()>().await;
            }
            self.tx
                .as_ref()
                .ok_or_else(|| ClientError::Transport("sink closed".to_string()))?
                .send(frame)
                .map_err(|_| ClientError::Transport("peer is gone".to_string()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        self.tx.take();
        Box::pin(async { Ok(()) })
    }
}

struct MemoryStream {
    rx: mpsc::UnboundedReceiver<String>,
}

impl FrameStream for MemoryStream {
    fn receive(&mut self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.rx
                .recv()
                .await
                .ok_or_else(|| ClientError::Transport("peer closed the connection".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut listener) = MemoryConnector::pair();
        let mut transport = connector
            .connect("mem://test", Duration::from_secs(1))
            .await
            .expect("dial");
        let mut peer = listener.accept().await.expect("peer");

        transport.sink.send("hello".to_string()).await.expect("send");
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));

        assert!(peer.send_raw("world"));
        assert_eq!(transport.stream.receive().await.expect("receive"), "world");

        assert_eq!(connector.attempts(), 1);
        assert_eq!(connector.urls(), vec!["mem://test".to_string()]);
    }

    #[tokio::test]
    async fn test_refused_dials() {
        let (connector, _listener) = MemoryConnector::pair();
        connector.refuse_next(2);

        for _ in 0..2 {
            let result = connector.connect("mem://x", Duration::from_secs(1)).await;
            assert!(matches!(result, Err(ClientError::Transport(_))));
        }
        assert!(connector.connect("mem://x", Duration::from_secs(1)).await.is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_dial_waits_for_timeout() {
        let (connector, _listener) = MemoryConnector::pair();
        connector.stall_next(1);

        let started = tokio::time::Instant::now();
        let result = connector.connect("mem://x", Duration::from_secs(5)).await;

        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frozen_writes_never_complete() {
        let (connector, mut listener) = MemoryConnector::pair();
        connector.freeze_writes();
        let mut transport = connector
            .connect("mem://x", Duration::from_secs(1))
            .await
            .expect("dial");
        let mut peer = listener.accept().await.expect("peer");

        let send = tokio::time::timeout(
            Duration::from_secs(60),
            transport.sink.send("stuck".to_string()),
        )
        .await;

        assert!(send.is_err());
        assert!(peer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_close_from_either_side() {
        let (connector, mut listener) = MemoryConnector::pair();
        let mut transport = connector
            .connect("mem://x", Duration::from_secs(1))
            .await
            .expect("dial");
        let mut peer = listener.accept().await.expect("peer");

        peer.close();
        assert!(transport.stream.receive().await.is_err());
        assert!(!peer.send_raw("late"));

        transport.sink.close().await.expect("close");
        assert!(peer.recv().await.is_none());
        assert!(transport.sink.send("late".to_string()).await.is_err());
    }
}
