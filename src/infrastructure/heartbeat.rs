use crate::client::state::{ClientState, Inbound};
use crate::types::{DEFAULT_ACTIVITY_TIMEOUT, DEFAULT_PONG_TIMEOUT, PusherMessage};
use crate::websocket::TransportEvent;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{self, Instant};

/// Keeps an idle connection alive and detects a dead one.
///
/// After `activity_timeout` without any inbound frame a `pusher:ping` is sent; if nothing
/// arrives within `pong_timeout` after that, the connection is reported as failed.
pub struct HeartbeatManager {
    activity_timeout: Duration,
    pong_timeout: Duration,
    generation: u64,
    state: Weak<RwLock<ClientState>>,
    queue: mpsc::UnboundedSender<Inbound>,
}

impl HeartbeatManager {
    pub(crate) fn new(
        state: Weak<RwLock<ClientState>>,
        queue: mpsc::UnboundedSender<Inbound>,
        generation: u64,
    ) -> Self {
        Self {
            activity_timeout: Duration::from_millis(DEFAULT_ACTIVITY_TIMEOUT),
            pong_timeout: Duration::from_millis(DEFAULT_PONG_TIMEOUT),
            generation,
            state,
            queue,
        }
    }

    pub fn with_activity_timeout(mut self, timeout: Duration) -> Self {
        self.activity_timeout = timeout;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    /// Runs until the connection is replaced, the client is dropped or a pong is missed
    pub async fn run(self) {
        loop {
            // Client dropped, exit heartbeat task
            let Some(state) = self.state.upgrade() else {
                break;
            };
            let idle_deadline = {
                let state = state.read().await;
                if state.generation != self.generation {
                    break;
                }
                state.last_activity + self.activity_timeout
            };
            drop(state);

            if Instant::now() < idle_deadline {
                time::sleep_until(idle_deadline).await;
                continue;
            }

            let Some(state) = self.state.upgrade() else {
                break;
            };
            let ping_sent = Instant::now();
            if let Err(e) = state.read().await.send(&PusherMessage::ping()) {
                tracing::error!("[Heartbeat] Failed to send ping: {}", e);
                break;
            }
            tracing::debug!("Sent ping after {:?} idle", self.activity_timeout);
            drop(state);

            time::sleep(self.pong_timeout).await;

            let Some(state) = self.state.upgrade() else {
                break;
            };
            let last_activity = state.read().await.last_activity;
            if last_activity < ping_sent {
                tracing::warn!(
                    "[Heartbeat] No response within {:?}, closing connection",
                    self.pong_timeout
                );
                let _ = self.queue.send(Inbound::Transport {
                    generation: self.generation,
                    event: TransportEvent::Error("heartbeat timeout".to_string()),
                });
                break;
            }
        }
        tracing::debug!("Heartbeat for connection {} finished", self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionState;
    use crate::infrastructure::Timer;
    use crate::websocket::OutboundFrame;
    use std::sync::Arc;
    use tokio::sync::watch;

    struct Fixture {
        state: Arc<RwLock<ClientState>>,
        written: mpsc::UnboundedReceiver<OutboundFrame>,
        queue: mpsc::UnboundedReceiver<Inbound>,
        _state_rx: watch::Receiver<ConnectionState>,
    }

    fn fixture() -> Fixture {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initialized);
        let (notifier, queue) = mpsc::unbounded_channel();
        let (outbound, written) = mpsc::unbounded_channel();
        let mut state = ClientState::new(
            Timer::default(),
            Duration::from_secs(120),
            state_tx,
            notifier,
        );
        state.generation = 3;
        state.outbound = Some(outbound);
        Fixture {
            state: Arc::new(RwLock::new(state)),
            written,
            queue,
            _state_rx: state_rx,
        }
    }

    fn heartbeat(fixture: &Fixture, queue: mpsc::UnboundedSender<Inbound>) -> HeartbeatManager {
        HeartbeatManager::new(Arc::downgrade(&fixture.state), queue, 3)
            .with_activity_timeout(Duration::from_secs(10))
            .with_pong_timeout(Duration::from_secs(5))
    }

    fn is_ping(frame: OutboundFrame) -> bool {
        matches!(frame, OutboundFrame::Text(text) if text.contains("pusher:ping"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_reports_failure() {
        let mut f = fixture();
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        f.state.write().await.last_activity = Instant::now();
        let task = tokio::spawn(heartbeat(&f, queue_tx).run());

        time::sleep(Duration::from_secs(11)).await;
        assert!(is_ping(f.written.try_recv().unwrap()));

        time::sleep(Duration::from_secs(5)).await;
        task.await.unwrap();
        match queue_rx.try_recv().unwrap() {
            Inbound::Transport { generation, event } => {
                assert_eq!(generation, 3);
                assert_eq!(event, TransportEvent::Error("heartbeat timeout".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(f.queue.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_ping() {
        let mut f = fixture();
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
        f.state.write().await.last_activity = Instant::now();
        let task = tokio::spawn(heartbeat(&f, queue_tx).run());

        time::sleep(Duration::from_secs(8)).await;
        f.state.write().await.last_activity = Instant::now();
        time::sleep(Duration::from_secs(8)).await;
        assert!(f.written.try_recv().is_err());

        // Ping at 18s, answered at 20s
        time::sleep(Duration::from_secs(3)).await;
        assert!(is_ping(f.written.try_recv().unwrap()));
        time::sleep(Duration::from_secs(1)).await;
        f.state.write().await.last_activity = Instant::now();
        time::sleep(Duration::from_secs(5)).await;
        assert!(queue_rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_connection_replaced() {
        let f = fixture();
        let (queue_tx, _queue_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(heartbeat(&f, queue_tx).run());
        tokio::task::yield_now().await;

        f.state.write().await.generation = 4;
        time::sleep(Duration::from_secs(200)).await;

        assert!(task.is_finished());
    }
}
