//! Normalized event envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtoError;

/// Shape of an inbound frame before normalization.
///
/// `data` may be a string or any JSON value, so it is kept as a [`Value`]
/// until [`normalize_payload`] turns it into a string.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

/// A named message, optionally scoped to a topic, with a string payload.
///
/// The empty topic denotes the global topic. Events are immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "event")]
    name: String,
    #[serde(rename = "channel", skip_serializing_if = "String::is_empty")]
    topic: String,
    #[serde(rename = "data")]
    payload: String,
}

impl Event {
    /// Create an event from already-normalized parts.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic name, empty for global events.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Normalized payload.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Whether the event is not scoped to any topic.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.topic.is_empty()
    }

    /// Decode the payload as JSON into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not valid JSON for `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        serde_json::from_str(&self.payload).map_err(|e| ProtoError::Decoding(e.to_string()))
    }

    /// Serialize to a wire frame, carrying the payload as a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Decode a wire frame, normalizing its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object envelope.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        let wire: WireEnvelope =
            serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))?;

        Ok(Self {
            name: wire.event,
            topic: wire.channel.unwrap_or_default(),
            payload: normalize_payload(&wire.data)?,
        })
    }
}

/// Normalize a wire payload into its canonical string form.
///
/// Strings pass through untouched; every other value is re-serialized as
/// compact JSON. Object keys come out sorted, so the result is stable no
/// matter how the server ordered them.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn normalize_payload(value: &Value) -> Result<String, ProtoError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other).map_err(|e| ProtoError::Encoding(e.to_string())),
    }
}
