//! Connection engine.
//!
//! One task owns the connection state and drives it through
//! [`ConnectionState`] one step at a time. It dials through a
//! [`Connector`], interprets control events, runs the heartbeat on a single
//! periodic tick, and forwards every inbound event to the
//! [`TopicRegistry`].

mod io;
mod state;

pub use state::ConnectionState;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tether_proto::{ConnectionEstablished, ControlEvent, ErrorData, Event, Namespace, OutboundFrame};
use tokio::sync::watch;
use tokio::time::{interval, sleep, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::classify::{classify, ErrorPolicy};
use crate::config::ClientConfig;
use crate::outbox::Outbox;
use crate::registry::TopicRegistry;
use crate::timeout::{TimeoutReason, TimeoutSupervisor};
use crate::transport::Connector;

use io::Link;

/// Resolves once a close is requested or every close handle is dropped.
async fn close_requested(close: &mut watch::Receiver<bool>) {
    let _ = close.wait_for(|closed| *closed).await;
}

/// Await `op` unless a close is requested or `deadline` passes first, in
/// which case the state to move to is returned instead.
///
/// Every outbound wait in the engine goes through here, so a full outbound
/// queue never hides a close request or an elapsed deadline.
async fn bounded<F: Future>(
    close: &mut watch::Receiver<bool>,
    deadline: Option<Instant>,
    op: F,
) -> Result<F::Output, ConnectionState> {
    let expired = async {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        output = op => Ok(output),
        () = close_requested(close) => Err(ConnectionState::Stopped),
        () = expired => {
            warn!("outbound queue stalled past the armed deadline");
            Err(ConnectionState::TimedOut)
        }
    }
}

enum Wake {
    Event(Option<Event>),
    Tick(Instant),
    Close,
}

/// The connection state machine.
pub(crate) struct Engine {
    config: ClientConfig,
    url: String,
    namespace: Namespace,
    connector: Arc<dyn Connector>,
    registry: Arc<TopicRegistry>,
    outbox: Outbox,
    supervisor: TimeoutSupervisor,
    activity_timeout: Duration,
    reconnect_delay: Duration,
    link: Option<Link>,
    close: watch::Receiver<bool>,
    stopped: watch::Sender<bool>,
    ticker: Interval,
}

impl Engine {
    /// Build an engine. Must be called within a tokio runtime.
    pub(crate) fn new(
        config: ClientConfig,
        url: String,
        connector: Arc<dyn Connector>,
        registry: Arc<TopicRegistry>,
        outbox: Outbox,
        close: watch::Receiver<bool>,
        stopped: watch::Sender<bool>,
    ) -> Self {
        let mut ticker = interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            namespace: config.namespace(),
            activity_timeout: config.activity_timeout,
            config,
            url,
            connector,
            registry,
            outbox,
            supervisor: TimeoutSupervisor::new(),
            reconnect_delay: Duration::ZERO,
            link: None,
            close,
            stopped,
            ticker,
        }
    }

    /// Drive the state machine until it stops.
    pub(crate) async fn run(mut self) {
        info!(url = %self.url, "connection engine started");

        let mut state = ConnectionState::Start;
        while !state.is_terminal() {
            let next = self.step(state).await;
            if next != state {
                debug!(from = %state, to = %next, "state transition");
            }
            state = next;
        }

        self.stop().await;
        info!(url = %self.url, "connection engine stopped");
    }

    /// Run the step function for `state` and return the next state.
    pub(crate) async fn step(&mut self, state: ConnectionState) -> ConnectionState {
        match state {
            ConnectionState::Start => self.start().await,
            ConnectionState::Connected => self.connected().await,
            ConnectionState::TimedOut => self.timed_out().await,
            ConnectionState::Reconnecting => self.reconnecting().await,
            ConnectionState::Stopped => ConnectionState::Stopped,
        }
    }

    fn is_close_requested(&self) -> bool {
        *self.close.borrow() || self.close.has_changed().is_err()
    }

    async fn start(&mut self) -> ConnectionState {
        if self.is_close_requested() {
            return ConnectionState::Stopped;
        }

        if !self.reconnect_delay.is_zero() {
            let delay = self.reconnect_delay.min(self.config.max_reconnect_delay);
            debug!(delay = ?delay, "backing off before dialing");
            tokio::select! {
                () = sleep(delay) => {}
                () = close_requested(&mut self.close) => return ConnectionState::Stopped,
            }
        }

        self.supervisor
            .arm(TimeoutReason::Connecting, self.config.connect_timeout);
        let dialed = tokio::select! {
            result = self.connector.connect(&self.url, self.config.connect_timeout) => result,
            () = close_requested(&mut self.close) => return ConnectionState::Stopped,
        };

        match dialed {
            Ok(transport) => {
                let (link, sender) = Link::spawn(
                    transport,
                    self.config.inbound_capacity,
                    self.config.outbound_capacity,
                );
                self.outbox.attach(sender);
                self.link = Some(link);
                info!(url = %self.url, "transport connected");
                ConnectionState::Connected
            }
            Err(e) => {
                self.reconnect_delay = (self.reconnect_delay + self.config.reconnect_step)
                    .min(self.config.max_reconnect_delay);
                warn!(
                    error = %e,
                    retry_in = ?self.reconnect_delay,
                    "connection attempt failed"
                );
                ConnectionState::Start
            }
        }
    }

    async fn connected(&mut self) -> ConnectionState {
        let Some(link) = self.link.as_mut() else {
            return ConnectionState::Reconnecting;
        };

        let wake = tokio::select! {
            event = link.recv() => Wake::Event(event),
            tick = self.ticker.tick() => Wake::Tick(tick),
            () = close_requested(&mut self.close) => Wake::Close,
        };

        match wake {
            Wake::Event(Some(event)) => self.handle_event(event).await,
            Wake::Event(None) => {
                info!("transport closed");
                ConnectionState::Reconnecting
            }
            Wake::Tick(tick) => {
                if self.supervisor.is_expired(tick) {
                    ConnectionState::TimedOut
                } else {
                    ConnectionState::Connected
                }
            }
            Wake::Close => ConnectionState::Stopped,
        }
    }

    /// Interpret one inbound event, forward it to the registry and return
    /// the next state.
    pub(crate) async fn handle_event(&mut self, event: Event) -> ConnectionState {
        self.supervisor.touch();

        let next = match self.namespace.classify(event.name()) {
            Some(ControlEvent::Ping) => {
                let pong = OutboundFrame::pong(&self.namespace);
                match self.send(&pong).await {
                    Ok(()) => ConnectionState::Connected,
                    Err(next) => next,
                }
            }
            Some(ControlEvent::Pong) => {
                self.supervisor
                    .arm(TimeoutReason::Activity, self.activity_timeout);
                ConnectionState::Connected
            }
            Some(ControlEvent::Error) => self.on_error(&event),
            Some(ControlEvent::ConnectionEstablished) => self.on_established(&event).await,
            Some(ControlEvent::SubscriptionSucceeded) | None => ConnectionState::Connected,
        };

        self.registry.dispatch(&event);
        next
    }

    fn on_error(&mut self, event: &Event) -> ConnectionState {
        let data = event.payload_as::<ErrorData>().unwrap_or_else(|e| {
            warn!(error = %e, payload = %event.payload(), "undecodable error event");
            ErrorData::default()
        });
        let code = data.code();

        match classify(code) {
            ErrorPolicy::Fatal => {
                error!(code, message = %data.message, "fatal server error, stopping");
                ConnectionState::Stopped
            }
            ErrorPolicy::ReconnectWithDelay => {
                warn!(code, message = %data.message, "server asked to reconnect later");
                self.reconnect_delay = self.config.reconnect_step;
                ConnectionState::Reconnecting
            }
            ErrorPolicy::ReconnectImmediately => {
                warn!(code, message = %data.message, "server asked to reconnect");
                self.reconnect_delay = Duration::ZERO;
                ConnectionState::Reconnecting
            }
            ErrorPolicy::Ignore => {
                warn!(code, message = %data.message, "server error");
                ConnectionState::Connected
            }
        }
    }

    async fn on_established(&mut self, event: &Event) -> ConnectionState {
        let data = event
            .payload_as::<ConnectionEstablished>()
            .unwrap_or_else(|e| {
                warn!(error = %e, "undecodable connection_established payload");
                ConnectionEstablished::default()
            });

        let advertised = Duration::from_secs(data.activity_timeout);
        self.activity_timeout = if !advertised.is_zero() && advertised < self.config.activity_timeout
        {
            advertised
        } else {
            self.config.activity_timeout
        };

        info!(
            socket_id = %data.socket_id,
            activity_timeout_secs = self.activity_timeout.as_secs(),
            "connection established"
        );
        self.supervisor
            .arm(TimeoutReason::Activity, self.activity_timeout);
        self.reconnect_delay = Duration::ZERO;

        let deadline = self.supervisor.deadline();
        match bounded(&mut self.close, deadline, self.registry.set_connected(true)).await {
            Ok(()) => ConnectionState::Connected,
            Err(next) => next,
        }
    }

    async fn timed_out(&mut self) -> ConnectionState {
        match self.supervisor.reason() {
            TimeoutReason::Activity => {
                debug!("connection idle, sending heartbeat");
                self.supervisor
                    .arm(TimeoutReason::PingAwait, self.config.ping_timeout);
                let ping = OutboundFrame::ping(&self.namespace);
                match self.send(&ping).await {
                    Ok(()) => ConnectionState::Connected,
                    Err(next) => next,
                }
            }
            TimeoutReason::Connecting => {
                warn!(
                    timeout_secs = self.supervisor.duration().as_secs(),
                    "connection handshake timed out"
                );
                ConnectionState::Reconnecting
            }
            TimeoutReason::PingAwait => {
                warn!(
                    timeout_secs = self.supervisor.duration().as_secs(),
                    "heartbeat not answered"
                );
                ConnectionState::Reconnecting
            }
            TimeoutReason::None => ConnectionState::Connected,
        }
    }

    async fn reconnecting(&mut self) -> ConnectionState {
        self.teardown().await;
        ConnectionState::Start
    }

    async fn stop(&mut self) {
        self.teardown().await;
        self.stopped.send_replace(true);
    }

    async fn teardown(&mut self) {
        self.outbox.detach();
        self.supervisor.disarm();
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        self.registry.set_connected(false).await;
    }

    /// Queue a frame, bounded by the close signal and the armed deadline.
    /// A frame that cannot be queued because the connection is gone is
    /// logged and dropped.
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ConnectionState> {
        let deadline = self.supervisor.deadline();
        if let Err(e) = bounded(&mut self.close, deadline, self.outbox.send(frame)).await? {
            warn!(event = %frame.event, error = %e, "frame not sent");
        }
        Ok(())
    }
}
