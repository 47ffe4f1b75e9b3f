//! Protocol control events.
//!
//! Control event names live under a namespace prefix (`pusher` by default):
//! `pusher:ping`, `pusher:error`, `pusher_internal:subscription_succeeded`
//! and so on. The client interprets them; they are still delivered to bound
//! handlers like any other event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtoError;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "pusher";

/// Control events understood by the connection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// Server heartbeat request.
    Ping,
    /// Server heartbeat reply.
    Pong,
    /// Server reported an error.
    Error,
    /// Handshake completed.
    ConnectionEstablished,
    /// Topic subscription acknowledged.
    SubscriptionSucceeded,
}

/// Namespace prefix for control event names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace from its prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    /// The bare prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full name of a public control event, e.g. `pusher:ping`.
    #[must_use]
    pub fn event(&self, suffix: &str) -> String {
        format!("{}:{suffix}", self.0)
    }

    /// Full name of an internal control event, e.g.
    /// `pusher_internal:subscription_succeeded`.
    #[must_use]
    pub fn internal_event(&self, suffix: &str) -> String {
        format!("{}_internal:{suffix}", self.0)
    }

    /// Identify a control event by name.
    #[must_use]
    pub fn classify(&self, name: &str) -> Option<ControlEvent> {
        if let Some(suffix) = self.strip(name, ":") {
            return match suffix {
                "ping" => Some(ControlEvent::Ping),
                "pong" => Some(ControlEvent::Pong),
                "error" => Some(ControlEvent::Error),
                "connection_established" => Some(ControlEvent::ConnectionEstablished),
                _ => None,
            };
        }
        match self.strip(name, "_internal:") {
            Some("subscription_succeeded") => Some(ControlEvent::SubscriptionSucceeded),
            _ => None,
        }
    }

    fn strip<'a>(&self, name: &'a str, separator: &str) -> Option<&'a str> {
        name.strip_prefix(self.0.as_str())?.strip_prefix(separator)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Payload of an `<ns>:error` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    /// Human-readable reason.
    #[serde(default)]
    pub message: String,
    /// Numeric error code; servers send `null` for errors without one.
    #[serde(default)]
    pub code: Option<i64>,
}

impl ErrorData {
    /// Error code, zero when absent.
    #[must_use]
    pub fn code(&self) -> i64 {
        self.code.unwrap_or_default()
    }
}

/// Payload of an `<ns>:connection_established` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    /// Server-assigned socket identifier.
    #[serde(default)]
    pub socket_id: String,
    /// Server-advertised activity timeout in seconds.
    #[serde(default)]
    pub activity_timeout: u64,
}

/// Payload of an `<ns>:subscribe` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeData {
    /// Topic to subscribe to.
    pub channel: String,
    /// Authorization signature for protected topics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Extra topic data for presence-style topics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

impl SubscribeData {
    /// Plain subscription to a public topic.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            auth: None,
            channel_data: None,
        }
    }

    /// Attach an authorization signature.
    #[must_use]
    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Attach topic data.
    #[must_use]
    pub fn with_channel_data(mut self, data: impl Into<String>) -> Self {
        self.channel_data = Some(data.into());
        self
    }
}

/// A frame produced by the client.
///
/// Unlike [`crate::Event`], the data of an outbound frame keeps its JSON
/// shape: subscribe requests carry an object, heartbeats carry the string
/// `"{}"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    /// Event name.
    pub event: String,
    /// Event data.
    pub data: Value,
}

impl OutboundFrame {
    /// Create a frame from a name and any serializable data.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` cannot be represented as JSON.
    pub fn new<T: Serialize>(event: impl Into<String>, data: &T) -> Result<Self, ProtoError> {
        let data = serde_json::to_value(data).map_err(|e| ProtoError::Encoding(e.to_string()))?;
        Ok(Self {
            event: event.into(),
            data,
        })
    }

    /// `<ns>:subscribe` request.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscribe data cannot be encoded.
    pub fn subscribe(ns: &Namespace, data: &SubscribeData) -> Result<Self, ProtoError> {
        Self::new(ns.event("subscribe"), data)
    }

    /// `<ns>:unsubscribe` request.
    #[must_use]
    pub fn unsubscribe(ns: &Namespace, channel: &str) -> Self {
        Self {
            event: ns.event("unsubscribe"),
            data: serde_json::json!({ "channel": channel }),
        }
    }

    /// `<ns>:ping` heartbeat.
    #[must_use]
    pub fn ping(ns: &Namespace) -> Self {
        Self::heartbeat(ns.event("ping"))
    }

    /// `<ns>:pong` heartbeat reply.
    #[must_use]
    pub fn pong(ns: &Namespace) -> Self {
        Self::heartbeat(ns.event("pong"))
    }

    fn heartbeat(event: String) -> Self {
        Self {
            event,
            data: Value::String("{}".to_string()),
        }
    }

    /// Serialize to a wire frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }
}
