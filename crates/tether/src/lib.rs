//! # tether
//!
//! A resilient client for realtime publish/subscribe backends speaking the
//! Pusher-style WebSocket protocol.
//!
//! A [`Client`] holds one logical connection. It dials in the background,
//! answers heartbeats, reconnects with a linear backoff after failures, and
//! re-subscribes every topic once the server confirms the new connection.
//! Callers subscribe to topics and bind handlers without caring whether the
//! connection is currently up.
//!
//! ```no_run
//! use tether::{Client, ClientConfig, Endpoint, Event};
//!
//! # async fn example() -> tether::Result<()> {
//! let config = ClientConfig::default();
//! let endpoint = Endpoint::from_app_key("app-key", &config)?;
//! let client = Client::connect(&endpoint, config)?;
//!
//! let room = client.subscribe("room-1").await;
//! room.bind("msg", |event: &Event| println!("{}", event.payload()));
//! # Ok(())
//! # }
//! ```
//!
//! The `test-util` feature exposes an in-process transport,
//! `transport::MemoryConnector`, for exercising a client without a server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod outbox;
pub mod registry;
pub mod timeout;
pub mod topic;
pub mod transport;

pub use classify::{classify, ErrorPolicy};
pub use client::Client;
pub use config::ClientConfig;
pub use endpoint::Endpoint;
pub use engine::ConnectionState;
pub use error::{ClientError, Result};
pub use outbox::Outbox;
pub use registry::TopicRegistry;
pub use timeout::{TimeoutReason, TimeoutSupervisor};
pub use topic::{Handler, HandlerId, Topic};
pub use transport::{Connector, FrameSink, FrameStream, Transport, WsConnector};

pub use tether_proto::{Event, Namespace, SubscribeData};
