//! Topic registry.
//!
//! Holds every topic the caller subscribed to plus the global topic, and the
//! cached connected flag. The flag lives under the same lock as the topic
//! map, and every operation that sends requests holds the send lock from
//! reading that state until its last request is queued. A topic added or
//! removed concurrently with a connection change therefore gets exactly one
//! subscribe or unsubscribe request, in the order the operations ran.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tether_proto::{Event, Namespace, SubscribeData};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::outbox::Outbox;
use crate::topic::{Handler, HandlerId, Topic};

#[derive(Debug, Default)]
struct RegistryState {
    topics: HashMap<String, Arc<Topic>>,
    connected: bool,
}

/// Registry of subscribed topics.
#[derive(Debug)]
pub struct TopicRegistry {
    state: RwLock<RegistryState>,
    sends: Mutex<()>,
    global: Arc<Topic>,
    namespace: Namespace,
    outbox: Outbox,
}

impl TopicRegistry {
    /// Create an empty, disconnected registry.
    #[must_use]
    pub fn new(namespace: Namespace, outbox: Outbox) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            sends: Mutex::new(()),
            global: Arc::new(Topic::global(namespace.clone(), outbox.clone())),
            namespace,
            outbox,
        }
    }

    /// The global topic.
    #[must_use]
    pub fn global(&self) -> &Arc<Topic> {
        &self.global
    }

    /// Whether the registry currently considers the connection up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    /// Look up a topic. The empty name yields the global topic.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<Topic>> {
        if name.is_empty() {
            return Some(Arc::clone(&self.global));
        }
        self.state.read().topics.get(name).cloned()
    }

    /// Names of every registered topic.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.state.read().topics.keys().cloned().collect()
    }

    /// Register a topic, or return the existing one with that name.
    ///
    /// A topic created while connected is subscribed immediately.
    pub async fn add(&self, name: &str) -> Arc<Topic> {
        self.add_with(SubscribeData::new(name)).await
    }

    /// Register a topic with a custom subscribe request (for example one
    /// carrying an authorization signature).
    pub async fn add_with(&self, request: SubscribeData) -> Arc<Topic> {
        if request.channel.is_empty() {
            return Arc::clone(&self.global);
        }

        let _sends = self.sends.lock().await;
        let (topic, sender) = {
            let mut state = self.state.write();
            if let Some(existing) = state.topics.get(&request.channel) {
                return Arc::clone(existing);
            }
            let name = request.channel.clone();
            let topic = Arc::new(Topic::new(request, self.namespace.clone(), self.outbox.clone()));
            state.topics.insert(name, Arc::clone(&topic));
            let sender = if state.connected {
                self.outbox.sender()
            } else {
                None
            };
            (topic, sender)
        };

        debug!(topic = %topic.name(), connected = sender.is_some(), "topic added");
        if let Some(sender) = sender {
            topic.try_subscribe_on(&sender).await;
        }
        topic
    }

    /// Forget a topic, unsubscribing first if connected. The global topic
    /// cannot be removed.
    pub async fn remove(&self, name: &str) {
        if name.is_empty() {
            return;
        }

        let _sends = self.sends.lock().await;
        let (topic, sender) = {
            let mut state = self.state.write();
            let Some(topic) = state.topics.remove(name) else {
                return;
            };
            let sender = if state.connected {
                self.outbox.sender()
            } else {
                None
            };
            (topic, sender)
        };

        topic.set_subscribed(false);
        debug!(topic = %name, connected = sender.is_some(), "topic removed");
        if let Some(sender) = sender {
            if let Err(e) = topic.unsubscribe_on(&sender).await {
                warn!(topic = %name, error = %e, "unsubscribe request not sent");
            }
        }
    }

    /// Record a connection change.
    ///
    /// Going up subscribes every topic not yet subscribed; going down clears
    /// every subscribed flag without sending anything, since the connection
    /// is already gone.
    pub async fn set_connected(&self, connected: bool) {
        let _sends = self.sends.lock().await;
        let pending: Vec<Arc<Topic>> = {
            let mut state = self.state.write();
            state.connected = connected;
            if connected {
                state
                    .topics
                    .values()
                    .filter(|topic| !topic.is_subscribed())
                    .cloned()
                    .collect()
            } else {
                for topic in state.topics.values() {
                    topic.set_subscribed(false);
                }
                Vec::new()
            }
        };

        if pending.is_empty() {
            return;
        }
        let Some(sender) = self.outbox.sender() else {
            return;
        };
        debug!(count = pending.len(), "resubscribing topics");
        for topic in pending {
            topic.try_subscribe_on(&sender).await;
        }
    }

    /// Deliver an event to the global topic and, if it names a registered
    /// topic, to that topic. Events for unknown topics reach only the global
    /// topic.
    pub fn dispatch(&self, event: &Event) {
        self.global.handle_event(event);
        if event.is_global() {
            return;
        }
        if let Some(topic) = self.find(event.topic()) {
            topic.handle_event(event);
        }
    }

    /// Bind a handler on the global topic.
    pub fn bind<H: Handler + 'static>(&self, event: impl Into<String>, handler: H) -> HandlerId {
        self.global.bind(event, handler)
    }

    /// Unbind a handler from the global topic.
    pub fn unbind(&self, event: &str, id: HandlerId) -> bool {
        self.global.unbind(event, id)
    }
}
