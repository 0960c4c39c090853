use super::state::{ClientState, Inbound};
use crate::channel::SubscriptionManager;
use crate::infrastructure::HeartbeatManager;
use crate::messaging::{ControlFrame, MessageRouter, PusherEvent};
use crate::types::{
    CLOSE_CODE_NO_RECONNECT, CLOSE_CODE_RECONNECT_IMMEDIATELY, ConnectionData, PusherMessage,
};
use crate::websocket::{OutboundFrame, Transport, TransportConnection, TransportEvent};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Initialized,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeouts governing one client's connections
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionTimeouts {
    /// Handshake and close deadline
    pub timeout: Duration,
    /// Upper bound for the inactivity interval; the broker may ask for less
    pub activity_timeout: Duration,
    pub pong_timeout: Duration,
}

/// Drives the connection lifecycle.
///
/// Every connect attempt gets a new generation number; frames, timers and failures are
/// tagged with the generation they belong to and ignored once it is no longer current.
///
/// Lock order is client state, then channel registry, then individual channels.
pub struct ConnectionManager {
    url: String,
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ClientState>>,
    subscriptions: Arc<SubscriptionManager>,
    router: MessageRouter,
    queue: mpsc::UnboundedSender<Inbound>,
    timeouts: ConnectionTimeouts,
}

impl ConnectionManager {
    pub(crate) fn new(
        url: String,
        transport: Arc<dyn Transport>,
        state: Arc<RwLock<ClientState>>,
        subscriptions: Arc<SubscriptionManager>,
        queue: mpsc::UnboundedSender<Inbound>,
        timeouts: ConnectionTimeouts,
    ) -> Self {
        Self {
            url,
            transport,
            state,
            router: MessageRouter::new(Arc::clone(&subscriptions)),
            subscriptions,
            queue,
            timeouts,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Gets the current connection state
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.connection_state
    }

    /// Checks if currently connected
    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_connected()
    }

    pub async fn socket_id(&self) -> Option<String> {
        self.state.read().await.socket_id.clone()
    }

    /// Starts connecting; a connection that is up or coming up is left alone
    pub async fn connect(self: &Arc<Self>) {
        let mut state = self.state.write().await;
        match state.connection_state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                tracing::debug!("Already {}, ignoring connect", state.connection_state);
                return;
            }
            ConnectionState::Disconnecting => {
                state.teardown();
                self.subscriptions.reset_on_disconnect().await;
            }
            _ => {}
        }
        state.was_manual_disconnect = false;
        if let Some(token) = state.reconnect_cancel.take() {
            token.cancel();
        }
        self.start_attempt(&mut state);
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// A live connection goes through Disconnecting while the close handshake runs; a
    /// pending attempt or reconnect timer is cancelled and the state goes straight to
    /// Disconnected.
    pub async fn disconnect(self: &Arc<Self>) {
        let mut state = self.state.write().await;
        state.was_manual_disconnect = true;
        if let Some(token) = state.reconnect_cancel.take() {
            token.cancel();
        }

        match state.connection_state {
            ConnectionState::Disconnecting => {}
            ConnectionState::Initialized | ConnectionState::Disconnected => {
                state.set_connection_state(ConnectionState::Disconnected);
            }
            ConnectionState::Connected => {
                tracing::info!("Disconnecting");
                state.set_connection_state(ConnectionState::Disconnecting);
                if let Some(outbound) = &state.outbound {
                    let _ = outbound.send(OutboundFrame::Close);
                }
                let generation = state.generation;
                let queue = self.queue.clone();
                let timeout = self.timeouts.timeout;
                state.task_manager.spawn("close-timeout", async move {
                    tokio::time::sleep(timeout).await;
                    let _ = queue.send(Inbound::Transport {
                        generation,
                        event: TransportEvent::Error("close handshake timed out".to_string()),
                    });
                });
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                tracing::info!("Cancelling {} and disconnecting", state.connection_state);
                state.generation += 1;
                state.teardown();
                self.subscriptions.reset_on_disconnect().await;
                state.set_connection_state(ConnectionState::Disconnected);
            }
        }
    }

    fn start_attempt(self: &Arc<Self>, state: &mut ClientState) {
        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        if let Some(previous) = state.attempt_cancel.replace(token.clone()) {
            previous.cancel();
        }
        state.set_connection_state(ConnectionState::Connecting);
        tracing::info!("Connecting to {} (connection {})", self.url, generation);

        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_attempt(generation, token).await });
    }

    async fn run_attempt(self: Arc<Self>, generation: u64, token: CancellationToken) {
        let opened = tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Connect attempt {} cancelled", generation);
                return;
            }
            result = self.transport.open(&self.url) => result,
        };

        let TransportConnection {
            outbound,
            mut inbound,
        } = match opened {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Connect attempt {} failed: {}", generation, e);
                self.push(generation, TransportEvent::Error(e.to_string()));
                return;
            }
        };

        let mut state = self.state.write().await;
        if token.is_cancelled()
            || state.generation != generation
            || state.connection_state != ConnectionState::Connecting
        {
            tracing::debug!("Connect attempt {} superseded, closing socket", generation);
            let _ = outbound.send(OutboundFrame::Close);
            return;
        }
        state.outbound = Some(outbound);
        state.last_activity = Instant::now();

        let queue = self.queue.clone();
        state.task_manager.spawn("reader", async move {
            while let Some(event) = inbound.recv().await {
                let terminal = !matches!(event, TransportEvent::Frame(_));
                if queue.send(Inbound::Transport { generation, event }).is_err() || terminal {
                    return;
                }
            }
            let _ = queue.send(Inbound::Transport {
                generation,
                event: TransportEvent::Closed {
                    code: None,
                    reason: "transport dropped".to_string(),
                },
            });
        });

        let queue = self.queue.clone();
        let timeout = self.timeouts.timeout;
        let weak_state = Arc::downgrade(&self.state);
        state.task_manager.spawn("handshake-timeout", async move {
            tokio::time::sleep(timeout).await;
            let Some(state) = weak_state.upgrade() else {
                return;
            };
            let pending = {
                let state = state.read().await;
                state.generation == generation
                    && state.connection_state == ConnectionState::Connecting
            };
            if pending {
                let _ = queue.send(Inbound::Transport {
                    generation,
                    event: TransportEvent::Error("handshake timed out".to_string()),
                });
            }
        });
    }

    fn push(&self, generation: u64, event: TransportEvent) {
        let _ = self.queue.send(Inbound::Transport { generation, event });
    }

    /// Processes one item from the dispatch queue
    pub(crate) async fn handle_inbound(self: &Arc<Self>, item: Inbound) {
        match item {
            Inbound::Transport { generation, event } => {
                if self.state.read().await.generation != generation {
                    tracing::debug!("Dropping {:?} from stale connection {}", event, generation);
                    return;
                }
                match event {
                    TransportEvent::Frame(text) => self.handle_frame(generation, &text).await,
                    TransportEvent::Closed { code, reason } => {
                        self.handle_failure(generation, code, reason).await
                    }
                    TransportEvent::Error(reason) => {
                        self.handle_failure(generation, None, reason).await
                    }
                }
            }
            Inbound::Channel(event) => self.subscriptions.dispatch(event).await,
            Inbound::Global(event) => self.subscriptions.dispatch_global(&event).await,
        }
    }

    async fn handle_frame(self: &Arc<Self>, generation: u64, text: &str) {
        self.state.write().await.last_activity = Instant::now();

        let Some(control) = self.router.route(text).await else {
            return;
        };
        match control {
            ControlFrame::ConnectionEstablished(Some(data), event) => {
                self.on_established(generation, data, event).await
            }
            ControlFrame::ConnectionEstablished(None, _) => {
                self.handle_failure(generation, None, "handshake without socket_id".to_string())
                    .await
            }
            ControlFrame::Ping(event) => {
                if let Err(e) = self.state.read().await.send(&PusherMessage::pong()) {
                    tracing::warn!("Failed to answer ping: {}", e);
                }
                self.router.notify_global(&event).await;
            }
            ControlFrame::Pong(event) => self.router.notify_global(&event).await,
            ControlFrame::Error(event) => {
                match event.protocol_error() {
                    Some(error) => {
                        tracing::warn!("Broker error {:?}: {}", error.code, error.message)
                    }
                    None => tracing::warn!("Broker error without payload"),
                }
                self.router.notify_global(&event).await;
            }
        }
    }

    async fn on_established(
        self: &Arc<Self>,
        generation: u64,
        data: ConnectionData,
        event: PusherEvent,
    ) {
        {
            let mut state = self.state.write().await;
            if state.connection_state != ConnectionState::Connecting {
                tracing::debug!("Ignoring handshake in state {}", state.connection_state);
                return;
            }
            let activity_timeout = data
                .activity_timeout
                .map(Duration::from_secs)
                .map_or(self.timeouts.activity_timeout, |server| {
                    server.min(self.timeouts.activity_timeout)
                });

            state.socket_id = Some(data.socket_id.clone());
            state.activity_timeout = activity_timeout;
            state.attempt_cancel = None;
            state.timer.reset();
            state.set_connection_state(ConnectionState::Connected);

            let heartbeat =
                HeartbeatManager::new(Arc::downgrade(&self.state), self.queue.clone(), generation)
                    .with_activity_timeout(activity_timeout)
                    .with_pong_timeout(self.timeouts.pong_timeout);
            state.task_manager.spawn("heartbeat", heartbeat.run());
        }
        tracing::info!("Connected with socket id {}", data.socket_id);
        self.router.notify_global(&event).await;

        let subscriptions = Arc::clone(&self.subscriptions);
        tokio::spawn(async move { subscriptions.subscribe_pending(generation).await });
    }

    async fn handle_failure(self: &Arc<Self>, generation: u64, code: Option<u16>, reason: String) {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return;
        }
        match state.connection_state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            ConnectionState::Disconnecting => {
                tracing::debug!("Close finished: {}", reason);
                state.generation += 1;
                state.teardown();
                self.subscriptions.reset_on_disconnect().await;
                state.set_connection_state(ConnectionState::Disconnected);
                tracing::info!("Disconnected");
                return;
            }
            _ => return,
        }

        tracing::warn!("Connection lost: {} (code {:?})", reason, code);
        state.generation += 1;
        state.teardown();
        self.subscriptions.reset_on_disconnect().await;

        let terminal = code.is_some_and(|c| CLOSE_CODE_NO_RECONNECT.contains(&c));
        if state.was_manual_disconnect || terminal {
            if terminal {
                tracing::error!("Broker refused the connection (code {:?}), not reconnecting", code);
            }
            state.set_connection_state(ConnectionState::Disconnected);
        } else {
            let delay = if code.is_some_and(|c| CLOSE_CODE_RECONNECT_IMMEDIATELY.contains(&c)) {
                Duration::ZERO
            } else {
                state.timer.next_delay()
            };
            self.schedule_reconnect(&mut state, delay);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut ClientState, delay: Duration) {
        state.set_connection_state(ConnectionState::Reconnecting);
        let generation = state.generation;
        let token = CancellationToken::new();
        if let Some(previous) = state.reconnect_cancel.replace(token.clone()) {
            previous.cancel();
        }
        tracing::info!(
            "Reconnecting in {:?} (attempt {})",
            delay,
            state.timer.attempts()
        );

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Reconnect timer cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            let mut state = manager.state.write().await;
            if token.is_cancelled()
                || state.generation != generation
                || state.connection_state != ConnectionState::Reconnecting
                || state.was_manual_disconnect
            {
                return;
            }
            state.reconnect_cancel = None;
            manager.start_attempt(&mut state);
        });
    }
}
