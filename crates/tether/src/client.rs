//! Client handle.

use std::fmt;
use std::sync::Arc;

use tether_proto::SubscribeData;
use tokio::sync::watch;
use tracing::info;

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::engine::Engine;
use crate::error::Result;
use crate::outbox::Outbox;
use crate::registry::TopicRegistry;
use crate::topic::{Handler, HandlerId, Topic};
use crate::transport::{Connector, WsConnector};

struct ClientInner {
    registry: Arc<TopicRegistry>,
    close: watch::Sender<bool>,
    stopped: watch::Receiver<bool>,
}

/// Handle to one logical connection.
///
/// The connection is maintained in the background: it is dialed on
/// creation, and re-dialed after failures until [`Client::close`] is called,
/// the server reports a fatal error, or every handle is dropped. Topics and
/// handlers survive reconnects.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connect to `endpoint` over WebSocket.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn connect(endpoint: &Endpoint, config: ClientConfig) -> Result<Self> {
        Self::with_connector(endpoint.as_str(), config, Arc::new(WsConnector::new()))
    }

    /// Connect to `url` through a custom transport.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_connector(
        url: impl Into<String>,
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let outbox = Outbox::new();
        let registry = Arc::new(TopicRegistry::new(config.namespace(), outbox.clone()));
        let (close, close_rx) = watch::channel(false);
        let (stopped_tx, stopped) = watch::channel(false);

        let engine = Engine::new(
            config,
            url.into(),
            connector,
            Arc::clone(&registry),
            outbox,
            close_rx,
            stopped_tx,
        );
        tokio::spawn(engine.run());

        Ok(Self {
            inner: Arc::new(ClientInner {
                registry,
                close,
                stopped,
            }),
        })
    }

    /// Subscribe to a topic, creating it if needed.
    ///
    /// The subscribe request goes out now if connected, otherwise as soon as
    /// the connection is established. The empty name returns the global
    /// topic.
    pub async fn subscribe(&self, topic: &str) -> Arc<Topic> {
        self.inner.registry.add(topic).await
    }

    /// Subscribe with a custom request, for example one carrying an
    /// authorization signature.
    pub async fn subscribe_with(&self, request: SubscribeData) -> Arc<Topic> {
        self.inner.registry.add_with(request).await
    }

    /// Forget a topic, unsubscribing if connected. No-op for the global
    /// topic and unknown names.
    pub async fn unsubscribe(&self, topic: &str) {
        self.inner.registry.remove(topic).await;
    }

    /// Look up a subscribed topic.
    #[must_use]
    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.inner.registry.find(name)
    }

    /// The global topic, which receives every event.
    #[must_use]
    pub fn global(&self) -> Arc<Topic> {
        Arc::clone(self.inner.registry.global())
    }

    /// Bind a handler for `event` on every topic.
    pub fn bind<H: Handler + 'static>(&self, event: impl Into<String>, handler: H) -> HandlerId {
        self.inner.registry.bind(event, handler)
    }

    /// Remove a handler bound with [`Client::bind`].
    pub fn unbind(&self, event: &str, id: HandlerId) -> bool {
        self.inner.registry.unbind(event, id)
    }

    /// Bind a handler receiving every event.
    pub fn bind_all<H: Handler + 'static>(&self, handler: H) -> HandlerId {
        self.inner.registry.global().bind_all(handler)
    }

    /// Remove a handler bound with [`Client::bind_all`].
    pub fn unbind_all(&self, id: HandlerId) -> bool {
        self.inner.registry.global().unbind_all(id)
    }

    /// Stop the connection for good. Safe to call repeatedly.
    pub fn close(&self) {
        if !self.inner.close.send_replace(true) {
            info!("closing client");
        }
    }

    /// Whether [`Client::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.close.borrow()
    }

    /// Whether the connection engine has halted.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.borrow() || self.inner.stopped.has_changed().is_err()
    }

    /// Wait until the connection engine has halted, after a close or a fatal
    /// server error.
    pub async fn wait_stopped(&self) {
        let mut stopped = self.inner.stopped.clone();
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("topics", &self.inner.registry.names())
            .field("closed", &self.is_closed())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
