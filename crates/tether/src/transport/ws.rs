//! WebSocket transport over `tokio-tungstenite`.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{BoxFuture, Connector, FrameSink, FrameStream, Transport};
use crate::error::{ClientError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn connect<'a>(
        &'a self,
        url: &'a str,
        handshake_timeout: Duration,
    ) -> BoxFuture<'a, Result<Transport>> {
        Box::pin(async move {
            let (socket, _) = timeout(handshake_timeout, tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| ClientError::Transport("handshake timed out".to_string()))?
                .map_err(|e| ClientError::Transport(format!("failed to connect: {e}")))?;

            debug!(url = %url, "websocket connected");
            let (write, read) = socket.split();
            Ok(Transport::new(
                Box::new(WsSink { write }),
                Box::new(WsReader { read }),
            ))
        })
    }
}

struct WsSink {
    write: SplitSink<WsStream, Message>,
}

impl FrameSink for WsSink {
    fn send(&mut self, frame: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.write
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| ClientError::Transport(format!("send failed: {e}")))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.write
                .close()
                .await
                .map_err(|e| ClientError::Transport(format!("close failed: {e}")))
        })
    }
}

struct WsReader {
    read: SplitStream<WsStream>,
}

impl FrameStream for WsReader {
    fn receive(&mut self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            loop {
                match self.read.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => return Ok(text),
                        Err(_) => warn!(len = bytes.len(), "skipping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default();
                        return Err(ClientError::Transport(format!(
                            "connection closed by peer: {reason}"
                        )));
                    }
                    // Control frames are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(ClientError::Transport(format!("receive failed: {e}")));
                    }
                    None => return Err(ClientError::Transport("connection closed".to_string())),
                }
            }
        })
    }
}
