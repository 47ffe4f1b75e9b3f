//! Per-transport reader and writer tasks.

use std::time::Duration;

use tether_proto::Event;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::outbox::FrameSender;
use crate::transport::{FrameSink, FrameStream, Transport};

/// How long teardown waits for the writer to close the transport.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Decode frames into events and post them to the inbound queue.
///
/// Waits for queue space rather than dropping. Returns on the first receive
/// error, dropping the sender so the engine sees the queue close.
pub(super) async fn read_loop(mut stream: Box<dyn FrameStream>, inbound: mpsc::Sender<Event>) {
    loop {
        let frame = match stream.receive().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "transport read ended");
                return;
            }
        };

        match Event::from_json(&frame) {
            Ok(event) => {
                if inbound.send(event).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "dropping undecodable frame"),
        }
    }
}

/// Drain the outbound queue into the transport, then close it.
///
/// Exits when the queue closes, a send fails, or shutdown is signalled.
pub(super) async fn write_loop(
    mut sink: Box<dyn FrameSink>,
    mut outbound: mpsc::Receiver<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(frame).await {
                    debug!(error = %e, "transport write failed");
                    break;
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "transport close failed");
    }
}

/// Tasks and queues bound to one live transport.
#[derive(Debug)]
pub(super) struct Link {
    inbound: mpsc::Receiver<Event>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl Link {
    /// Spawn the reader and writer for `transport`. Returns the link and the
    /// sender half of its outbound queue.
    pub(super) fn spawn(
        transport: Transport,
        inbound_capacity: usize,
        outbound_capacity: usize,
    ) -> (Self, FrameSender) {
        let Transport { sink, stream } = transport;
        let (inbound_tx, inbound) = mpsc::channel(inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();

        let reader = tokio::spawn(read_loop(stream, inbound_tx));
        let writer = tokio::spawn(write_loop(sink, outbound_rx, shutdown_rx));

        (
            Self {
                inbound,
                reader,
                writer,
                shutdown,
            },
            outbound_tx,
        )
    }

    /// Next inbound event; `None` once the reader has exited.
    pub(super) async fn recv(&mut self) -> Option<Event> {
        self.inbound.recv().await
    }

    /// Stop both tasks and close the transport.
    pub(super) async fn close(self) {
        let Self {
            reader,
            mut writer,
            shutdown,
            ..
        } = self;

        reader.abort();
        let _ = shutdown.send(());
        if timeout(WRITER_CLOSE_TIMEOUT, &mut writer).await.is_err() {
            warn!("writer did not stop in time, aborting");
            writer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Connector, MemoryConnector};

    async fn dial() -> (Transport, crate::transport::MemoryPeer) {
        let (connector, mut listener) = MemoryConnector::pair();
        let transport = connector
            .connect("mem://io", Duration::from_secs(1))
            .await
            .expect("dial");
        let peer = listener.accept().await.expect("peer");
        (transport, peer)
    }

    #[tokio::test]
    async fn test_full_inbound_queue_blocks_without_dropping() {
        let (transport, peer) = dial().await;
        let (tx, mut rx) = mpsc::channel(1);
        let reader = tokio::spawn(read_loop(transport.stream, tx));

        for i in 0..20 {
            assert!(peer.send_raw(format!(r#"{{"event":"e{i}","data":"x"}}"#)));
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!reader.is_finished());

        for i in 0..20 {
            let event = rx.recv().await.expect("event");
            assert_eq!(event.name(), format!("e{i}"));
        }
        reader.abort();
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let (transport, peer) = dial().await;
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(read_loop(transport.stream, tx));

        peer.send_raw("not json");
        peer.send_raw(r#"{"event":"ok","data":{"a":1}}"#);

        let event = rx.recv().await.expect("event");
        assert_eq!(event.name(), "ok");
        assert_eq!(event.payload(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_reader_closes_queue_on_disconnect() {
        let (transport, mut peer) = dial().await;
        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(read_loop(transport.stream, tx));

        peer.close();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_writer_sends_in_order_and_closes() {
        let (transport, mut peer) = dial().await;
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown, shutdown_rx) = oneshot::channel();
        let writer = tokio::spawn(write_loop(transport.sink, rx, shutdown_rx));

        tx.send("one".to_string()).await.expect("queue");
        tx.send("two".to_string()).await.expect("queue");
        drop(tx);
        writer.await.expect("writer");

        assert_eq!(peer.recv().await.as_deref(), Some("one"));
        assert_eq!(peer.recv().await.as_deref(), Some("two"));
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_link_close_closes_transport() {
        let (transport, mut peer) = dial().await;
        let (link, sender) = Link::spawn(transport, 4, 4);

        link.close().await;

        assert!(peer.recv().await.is_none());
        assert!(sender.send("late".to_string()).await.is_err());
    }
}
