//! WebSocket integration tests.
//!
//! Runs the client against a mock server speaking the wire protocol over a
//! real `tokio-tungstenite` socket.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tether::{Client, ClientConfig, Endpoint, Event};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

// ============================================================================
// Test Helpers - Mock Server
// ============================================================================

struct MockServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockServer {
    async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    fn url(&self) -> String {
        format!("ws://{}/app/test-key", self.addr)
    }

    /// Accept one connection, returning the socket and the request URI.
    async fn accept(&self) -> (WebSocketStream<TcpStream>, String) {
        let (stream, _) = timeout(Duration::from_secs(10), self.listener.accept())
            .await
            .expect("client dialed")
            .expect("tcp accept");

        let (uri_tx, mut uri_rx) = mpsc::unbounded_channel();
        let callback = move |request: &Request, response: Response| {
            let _ = uri_tx.send(request.uri().to_string());
            Ok::<Response, ErrorResponse>(response)
        };
        let ws = accept_hdr_async(stream, callback).await.expect("handshake");
        let uri = uri_rx.recv().await.expect("request uri");
        (ws, uri)
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("server send");
}

async fn establish(ws: &mut WebSocketStream<TcpStream>) {
    let data = json!({ "socket_id": "1.1", "activity_timeout": 120 }).to_string();
    send(ws, json!({ "event": "pusher:connection_established", "data": data })).await;
}

/// Next text frame from the client, or `None` once it closed.
async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Option<Value> {
    loop {
        let message = timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("client frame in time")?;
        match message {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).expect("client sends JSON"));
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

fn connect(server: &MockServer) -> Client {
    let config = ClientConfig::default();
    let endpoint = Endpoint::parse(&server.url(), &config).expect("endpoint");
    Client::connect(&endpoint, config).expect("client")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_handshake_carries_client_parameters() {
    let server = MockServer::new().await.expect("bind");
    let client = connect(&server);

    let (_ws, uri) = server.accept().await;

    assert!(uri.starts_with("/app/test-key?"), "{uri}");
    assert!(uri.contains("protocol=7"), "{uri}");
    assert!(uri.contains("client=tether"), "{uri}");
    client.close();
}

#[tokio::test]
async fn test_subscribe_and_receive_over_websocket() {
    let server = MockServer::new().await.expect("bind");
    let client = connect(&server);
    let room = client.subscribe("room-1").await;
    let (tx, mut payloads) = mpsc::unbounded_channel();
    room.bind("msg", move |event: &Event| {
        let _ = tx.send(event.payload().to_string());
    });

    let (mut ws, _) = server.accept().await;
    establish(&mut ws).await;

    assert_eq!(
        next_text(&mut ws).await,
        Some(json!({ "event": "pusher:subscribe", "data": { "channel": "room-1" } }))
    );

    send(
        &mut ws,
        json!({ "event": "msg", "channel": "room-1", "data": { "text": "hello" } }),
    )
    .await;
    let payload = timeout(Duration::from_secs(5), payloads.recv())
        .await
        .expect("dispatched")
        .expect("handler alive");
    assert_eq!(payload, r#"{"text":"hello"}"#);

    client.close();
    timeout(Duration::from_secs(5), client.wait_stopped())
        .await
        .expect("stopped");
    assert_eq!(next_text(&mut ws).await, None);
}

#[tokio::test]
async fn test_reconnects_after_server_drops_socket() {
    let server = MockServer::new().await.expect("bind");
    let client = connect(&server);
    client.subscribe("room-1").await;

    let (mut first, _) = server.accept().await;
    establish(&mut first).await;
    assert!(next_text(&mut first).await.is_some());
    drop(first);

    let (mut second, _) = server.accept().await;
    establish(&mut second).await;
    assert_eq!(
        next_text(&mut second).await,
        Some(json!({ "event": "pusher:subscribe", "data": { "channel": "room-1" } }))
    );

    client.close();
}

#[tokio::test]
async fn test_fatal_error_over_websocket() {
    let server = MockServer::new().await.expect("bind");
    let client = connect(&server);

    let (mut ws, _) = server.accept().await;
    establish(&mut ws).await;
    send(
        &mut ws,
        json!({ "event": "pusher:error", "data": { "message": "over quota", "code": 4004 } }),
    )
    .await;

    timeout(Duration::from_secs(5), client.wait_stopped())
        .await
        .expect("stopped");
    assert!(client.is_stopped());
}
