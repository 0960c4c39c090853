// In-memory transport and authorizer used by the unit tests
use crate::auth::{AuthorizationResponse, Authorizer};
use crate::types::{PusherError, Result};
use crate::websocket::{OutboundFrame, Transport, TransportConnection, TransportEvent};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

/// Broker side of one socket opened through [`MockTransport`]
pub(crate) struct MockConnection {
    pub url: String,
    pub written: mpsc::UnboundedReceiver<OutboundFrame>,
    pub server: mpsc::UnboundedSender<TransportEvent>,
}

impl MockConnection {
    pub fn send(&self, frame: Value) {
        let _ = self.server.send(TransportEvent::Frame(frame.to_string()));
    }

    pub fn establish(&self, socket_id: &str) {
        self.send(json!({
            "event": "pusher:connection_established",
            "data": json!({"socket_id": socket_id, "activity_timeout": 120}).to_string(),
        }));
    }

    pub fn confirm(&self, channel: &str) {
        self.send(json!({
            "event": "pusher_internal:subscription_succeeded",
            "channel": channel,
            "data": "{}",
        }));
    }

    pub fn close(&self, code: Option<u16>) {
        let _ = self.server.send(TransportEvent::Closed {
            code,
            reason: "closed by broker".to_string(),
        });
    }

    /// Next text frame written by the client
    pub async fn next_frame(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(600), self.written.recv())
                .await
                .expect("no frame written within 600s")
                .expect("client dropped the socket");
            if let OutboundFrame::Text(text) = frame {
                return serde_json::from_str(&text).expect("client wrote invalid JSON");
            }
        }
    }

    /// Everything written so far, `Close` included
    pub fn drain(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.written.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Transport handing each opened socket to the test
pub(crate) struct MockTransport {
    connections: mpsc::UnboundedSender<MockConnection>,
    opens: AtomicUsize,
    failures: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockConnection>) {
        let (connections, accepted) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connections,
            opens: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        });
        (transport, accepted)
    }

    /// Makes the next `count` opens fail
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &str) -> Result<TransportConnection> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PusherError::Transport("connection refused".to_string()));
        }

        let (outbound, written) = mpsc::unbounded_channel();
        let (server, inbound) = mpsc::unbounded_channel();
        let _ = self.connections.send(MockConnection {
            url: url.to_string(),
            written,
            server,
        });
        Ok(TransportConnection { outbound, inbound })
    }
}

/// Authorizer with a fixed answer; optionally blocks until released
pub(crate) struct MockAuthorizer {
    response: std::result::Result<AuthorizationResponse, String>,
    requests: Mutex<Vec<(String, String)>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockAuthorizer {
    pub fn granting(response: AuthorizationResponse) -> Self {
        Self {
            response: Ok(response),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn denying(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }

    /// Holds every request until the returned `Notify` is signalled
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn authorize(&self, channel: &str, socket_id: &str) -> Result<AuthorizationResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((channel.to_string(), socket_id.to_string()));
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.response
            .clone()
            .map_err(|message| PusherError::Authorization {
                channel: channel.to_string(),
                message,
            })
    }
}
