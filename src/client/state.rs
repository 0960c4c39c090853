use super::connection::ConnectionState;
use crate::infrastructure::{TaskManager, Timer};
use crate::messaging::PusherEvent;
use crate::types::{PusherError, PusherMessage, Result, channel_events};
use crate::websocket::{OutboundFrame, TransportEvent};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Work item for the dispatch task
///
/// Everything that reaches application handlers goes through one queue, so handlers observe
/// exactly one order of events.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// From the socket of connection `generation`; dropped if that connection is gone
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    /// Locally raised channel notification, routed like a broker event
    Channel(PusherEvent),
    /// Locally raised notification for global handlers only
    Global(PusherEvent),
}

/// Consolidated mutable state for PusherClient
/// Using a single struct reduces lock contention
pub struct ClientState {
    pub connection_state: ConnectionState,

    /// Broker-assigned id of the live connection
    pub socket_id: Option<String>,

    /// Bumped for every connect attempt; stale tasks compare against it
    pub generation: u64,

    /// Writer of the live socket
    pub(crate) outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,

    /// Background tasks tied to the live socket
    pub task_manager: TaskManager,

    /// Reconnect backoff
    pub timer: Timer,

    /// Whether the disconnect was manual (prevents auto-reconnect)
    pub was_manual_disconnect: bool,

    pub(crate) reconnect_cancel: Option<CancellationToken>,
    pub(crate) attempt_cancel: Option<CancellationToken>,

    /// Last time anything arrived from the broker
    pub last_activity: Instant,

    /// Inactivity after which a ping is sent, as negotiated on the live connection
    pub activity_timeout: Duration,

    state_change_tx: watch::Sender<ConnectionState>,
    notifier: mpsc::UnboundedSender<Inbound>,
}

impl ClientState {
    pub(crate) fn new(
        timer: Timer,
        activity_timeout: Duration,
        state_change_tx: watch::Sender<ConnectionState>,
        notifier: mpsc::UnboundedSender<Inbound>,
    ) -> Self {
        Self {
            connection_state: ConnectionState::Initialized,
            socket_id: None,
            generation: 0,
            outbound: None,
            task_manager: TaskManager::new(),
            timer,
            was_manual_disconnect: false,
            reconnect_cancel: None,
            attempt_cancel: None,
            last_activity: Instant::now(),
            activity_timeout,
            state_change_tx,
            notifier,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Writes a frame to the live socket
    pub fn send(&self, message: &PusherMessage) -> Result<()> {
        let text = message.to_text()?;
        let outbound = self.outbound.as_ref().ok_or(PusherError::NotConnected)?;
        outbound
            .send(OutboundFrame::Text(text))
            .map_err(|_| PusherError::NotConnected)
    }

    /// Moves to `next`, notifying watchers and global handlers; no-op if unchanged
    pub fn set_connection_state(&mut self, next: ConnectionState) {
        let previous = self.connection_state;
        if previous == next {
            return;
        }
        self.connection_state = next;
        tracing::debug!("Connection state: {} -> {}", previous, next);

        if self.state_change_tx.send(next).is_err() {
            tracing::debug!(
                "State change watcher disconnected, could not notify state: {:?}",
                next
            );
        }

        let event = PusherEvent::local(
            channel_events::CONNECTION_STATE_CHANGED,
            None,
            serde_json::json!({
                "previous": previous.as_str(),
                "current": next.as_str(),
            }),
        );
        let _ = self.notifier.send(Inbound::Global(event));
    }

    /// Drops everything tied to the live socket
    pub(crate) fn teardown(&mut self) {
        self.task_manager.abort_all();
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(OutboundFrame::Close);
        }
        if let Some(token) = self.attempt_cancel.take() {
            token.cancel();
        }
        self.socket_id = None;
    }
}
