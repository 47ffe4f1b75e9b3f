//! Endpoint URL construction.

use std::fmt;

use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Host used when connecting by application key.
pub const DEFAULT_HOST: &str = "ws.pusherapp.com";

/// Port used when connecting by application key.
pub const DEFAULT_PORT: u16 = 443;

/// A fully-qualified WebSocket endpoint, including the client query
/// parameters the server expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Endpoint for an application key on the default host.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or produces an invalid URL.
    pub fn from_app_key(key: &str, config: &ClientConfig) -> Result<Self, ClientError> {
        if key.is_empty() {
            return Err(ClientError::InvalidEndpoint(
                "application key cannot be empty".to_string(),
            ));
        }
        Self::parse(
            &format!("wss://{DEFAULT_HOST}:{DEFAULT_PORT}/app/{key}"),
            config,
        )
    }

    /// Endpoint from an explicit URL. Existing query parameters are kept;
    /// the client parameters are set on top of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not a WebSocket URL.
    pub fn parse(raw: &str, config: &ClientConfig) -> Result<Self, ClientError> {
        let mut url =
            Url::parse(raw).map_err(|e| ClientError::InvalidEndpoint(format!("{raw}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let reserved = ["protocol", "version", "client"];
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !reserved.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("protocol", &config.protocol_version.to_string())
            .append_pair("version", &config.client_version)
            .append_pair("client", &config.client_name);

        Ok(Self { url })
    }

    /// The endpoint as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
