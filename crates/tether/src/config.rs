//! Client configuration.
//!
//! Every timeout is independently settable. Configuration files are JSON
//! documents whose durations are expressed in whole seconds; missing fields
//! fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_proto::Namespace;

use crate::error::ClientError;

/// Default time allowed for dialing plus the server handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle time before a heartbeat ping is sent.
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

/// Default wait for a pong after a heartbeat ping.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling for the reconnect backoff.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Amount the reconnect backoff grows per failed dial.
pub const DEFAULT_RECONNECT_STEP: Duration = Duration::from_secs(1);

/// Period of the clock tick feeding the timeout supervisor.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Capacity of the reader → engine queue.
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

/// Capacity of the engine → writer queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 10;

/// Wire protocol version advertised to the server.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 7;

/// Client name advertised to the server.
pub const DEFAULT_CLIENT_NAME: &str = "tether";

/// Configuration for a [`crate::Client`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time allowed for dialing plus the server handshake.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Idle time before a heartbeat ping is sent. A smaller value advertised
    /// by the server takes precedence.
    #[serde(with = "secs")]
    pub activity_timeout: Duration,
    /// Wait for a pong before the connection is declared dead.
    #[serde(with = "secs")]
    pub ping_timeout: Duration,
    /// Ceiling for the reconnect backoff.
    #[serde(with = "secs")]
    pub max_reconnect_delay: Duration,
    /// Backoff growth per failed dial, also the delay requested by
    /// retryable server errors.
    #[serde(with = "secs")]
    pub reconnect_step: Duration,
    /// Period of the supervisor clock tick.
    #[serde(with = "secs")]
    pub tick_interval: Duration,
    /// Capacity of the inbound event queue.
    pub inbound_capacity: usize,
    /// Capacity of the outbound frame queue.
    pub outbound_capacity: usize,
    /// Control event namespace prefix.
    pub namespace: String,
    /// Client name sent in the endpoint query.
    pub client_name: String,
    /// Client version sent in the endpoint query.
    pub client_version: String,
    /// Protocol version sent in the endpoint query.
    pub protocol_version: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            reconnect_step: DEFAULT_RECONNECT_STEP,
            tick_interval: DEFAULT_TICK_INTERVAL,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            namespace: tether_proto::DEFAULT_NAMESPACE.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the activity timeout.
    #[must_use]
    pub const fn with_activity_timeout(mut self, timeout: Duration) -> Self {
        self.activity_timeout = timeout;
        self
    }

    /// Set the ping timeout.
    #[must_use]
    pub const fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the reconnect backoff ceiling.
    #[must_use]
    pub const fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Set the reconnect backoff step.
    #[must_use]
    pub const fn with_reconnect_step(mut self, step: Duration) -> Self {
        self.reconnect_step = step;
        self
    }

    /// Set the supervisor tick period.
    #[must_use]
    pub const fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the inbound and outbound queue capacities.
    #[must_use]
    pub const fn with_queue_capacities(mut self, inbound: usize, outbound: usize) -> Self {
        self.inbound_capacity = inbound;
        self.outbound_capacity = outbound;
        self
    }

    /// Set the control event namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Control event namespace.
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.namespace.clone())
    }

    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClientError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> Result<Self, ClientError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| ClientError::Config(format!("invalid JSON: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is unusable.
    pub fn validate(&self) -> Result<(), ClientError> {
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("activity_timeout", self.activity_timeout),
            ("ping_timeout", self.ping_timeout),
            ("tick_interval", self.tick_interval),
        ] {
            if value.is_zero() {
                return Err(ClientError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.reconnect_step > self.max_reconnect_delay {
            return Err(ClientError::Config(
                "reconnect_step cannot exceed max_reconnect_delay".to_string(),
            ));
        }

        if self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            return Err(ClientError::Config(
                "queue capacities must be greater than zero".to_string(),
            ));
        }

        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(ClientError::Config(format!(
                "invalid namespace '{}'",
                self.namespace
            )));
        }

        Ok(())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
