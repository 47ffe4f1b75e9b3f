//! Topics and their handler tables.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tether_proto::{ControlEvent, Event, Namespace, OutboundFrame, SubscribeData};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::outbox::{send_frame, FrameSender, Outbox};

/// Receives events delivered to a topic.
///
/// Handlers run on the connection engine's task, in receive order, so they
/// should return quickly. Panics are not caught.
pub trait Handler: Send + Sync {
    /// Handle one event.
    fn handle_event(&self, event: &Event);
}

impl<F> Handler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        self(event);
    }
}

/// Identifies a bound handler so it can be unbound later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

impl HandlerId {
    fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type HandlerTable = HashMap<String, Vec<(HandlerId, Arc<dyn Handler>)>>;

/// A named subscription stream and the handlers bound to it.
///
/// The topic with the empty name is the global topic: it sees every event
/// and is never subscribed or unsubscribed on the wire.
pub struct Topic {
    request: SubscribeData,
    namespace: Namespace,
    outbox: Outbox,
    subscribed: AtomicBool,
    handlers: RwLock<HandlerTable>,
}

impl Topic {
    pub(crate) fn new(request: SubscribeData, namespace: Namespace, outbox: Outbox) -> Self {
        Self {
            request,
            namespace,
            outbox,
            subscribed: AtomicBool::new(false),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn global(namespace: Namespace, outbox: Outbox) -> Self {
        Self::new(SubscribeData::new(""), namespace, outbox)
    }

    /// Topic name; empty for the global topic.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.request.channel
    }

    /// Whether this is the global topic.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.request.channel.is_empty()
    }

    /// Whether the server acknowledged the subscription on the current
    /// connection.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::SeqCst);
    }

    /// Bind a handler to an event name. The empty name receives every event.
    pub fn bind<H: Handler + 'static>(&self, event: impl Into<String>, handler: H) -> HandlerId {
        let id = HandlerId::next();
        self.handlers
            .write()
            .entry(event.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not bound to `event`.
    pub fn unbind(&self, event: &str, id: HandlerId) -> bool {
        let mut table = self.handlers.write();
        let Some(list) = table.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(bound, _)| *bound != id);
        let removed = list.len() != before;
        if list.is_empty() {
            table.remove(event);
        }
        removed
    }

    /// Bind a handler receiving every event on this topic.
    pub fn bind_all<H: Handler + 'static>(&self, handler: H) -> HandlerId {
        self.bind("", handler)
    }

    /// Remove a catch-all handler.
    pub fn unbind_all(&self, id: HandlerId) -> bool {
        self.unbind("", id)
    }

    /// Number of handlers bound to `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Deliver an event to the bound handlers: exact-name handlers first,
    /// then catch-all handlers, each in bind order.
    ///
    /// A subscription acknowledgment marks the topic subscribed before any
    /// handler runs.
    pub fn handle_event(&self, event: &Event) {
        if self.namespace.classify(event.name()) == Some(ControlEvent::SubscriptionSucceeded) {
            self.set_subscribed(true);
        }

        let snapshot: Vec<Arc<dyn Handler>> = {
            let table = self.handlers.read();
            let exact = if event.name().is_empty() {
                None
            } else {
                table.get(event.name())
            };
            exact
                .into_iter()
                .chain(table.get(""))
                .flatten()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        for handler in snapshot {
            handler.handle_event(event);
        }
    }

    /// Send a subscribe request on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when there is no connection.
    pub async fn subscribe(&self) -> Result<(), ClientError> {
        if self.is_global() {
            return Ok(());
        }
        let sender = self.outbox.sender().ok_or(ClientError::NotConnected)?;
        self.subscribe_on(&sender).await
    }

    /// Send an unsubscribe request on the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when there is no connection.
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        if self.is_global() {
            return Ok(());
        }
        let sender = self.outbox.sender().ok_or(ClientError::NotConnected)?;
        self.unsubscribe_on(&sender).await
    }

    pub(crate) async fn subscribe_on(&self, sender: &FrameSender) -> Result<(), ClientError> {
        if self.is_global() {
            return Ok(());
        }
        debug!(topic = %self.name(), "subscribing");
        let frame = OutboundFrame::subscribe(&self.namespace, &self.request)?;
        send_frame(sender, &frame).await
    }

    pub(crate) async fn unsubscribe_on(&self, sender: &FrameSender) -> Result<(), ClientError> {
        if self.is_global() {
            return Ok(());
        }
        debug!(topic = %self.name(), "unsubscribing");
        send_frame(sender, &OutboundFrame::unsubscribe(&self.namespace, self.name())).await
    }

    /// Subscribe on `sender`, logging instead of failing. Used where the
    /// connection may have gone away in the meantime.
    pub(crate) async fn try_subscribe_on(&self, sender: &FrameSender) {
        if let Err(e) = self.subscribe_on(sender).await {
            warn!(topic = %self.name(), error = %e, "subscribe request not sent");
        }
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name())
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}
