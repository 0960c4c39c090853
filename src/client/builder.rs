use super::connection::{ConnectionManager, ConnectionState, ConnectionTimeouts};
use super::state::{ClientState, Inbound};
use super::PusherClient;
use crate::auth::Authorizer;
use crate::channel::SubscriptionManager;
use crate::infrastructure::{BackoffPolicy, ExponentialBackoff, HttpAuthorizer, Timer};
use crate::types::{
    CLIENT_NAME, DEFAULT_ACTIVITY_TIMEOUT, DEFAULT_CLUSTER, DEFAULT_PONG_TIMEOUT,
    DEFAULT_TIMEOUT, PROTOCOL_VERSION, PusherError, Result,
};
use crate::websocket::{Transport, WebSocketTransport};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};
use url::Url;

#[derive(Debug, Clone)]
pub struct PusherClientOptions {
    /// Application key, e.g. `"9d6c8e0fc0a3a1d4b2b7"`
    pub app_key: String,
    /// Broker cluster used to derive the host. Default: `mt1`
    pub cluster: Option<String>,
    /// Explicit broker host, overriding the cluster
    pub host: Option<String>,
    pub port: Option<u16>,
    /// `wss` when true (default), `ws` otherwise
    pub use_tls: bool,
    /// Endpoint for the default HTTP authorizer
    pub auth_endpoint: Option<String>,
    pub auth_headers: Vec<(String, String)>,
    /// Handshake and close timeout in milliseconds
    pub timeout: Option<u64>,
    /// Maximum inactivity before a ping, in milliseconds
    pub activity_timeout: Option<u64>,
    /// How long to wait for any frame after a ping, in milliseconds
    pub pong_timeout: Option<u64>,
}

impl Default for PusherClientOptions {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            cluster: None,
            host: None,
            port: None,
            use_tls: true,
            auth_endpoint: None,
            auth_headers: Vec::new(),
            timeout: None,
            activity_timeout: None,
            pong_timeout: None,
        }
    }
}

impl PusherClientOptions {
    /// Broker URL for these options
    pub fn endpoint_url(&self) -> Result<Url> {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        let host = match &self.host {
            Some(host) => host.clone(),
            None => format!(
                "ws-{}.pusher.com",
                self.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER)
            ),
        };
        let port = self.port.unwrap_or(if self.use_tls { 443 } else { 80 });

        let mut url = Url::parse(&format!("{}://{}:{}/app/{}", scheme, host, port, self.app_key))?;
        url.query_pairs_mut()
            .append_pair("protocol", &PROTOCOL_VERSION.to_string())
            .append_pair("client", CLIENT_NAME)
            .append_pair("version", env!("CARGO_PKG_VERSION"))
            .append_pair("flash", "false");
        Ok(url)
    }

    fn timeouts(&self) -> ConnectionTimeouts {
        ConnectionTimeouts {
            timeout: Duration::from_millis(self.timeout.unwrap_or(DEFAULT_TIMEOUT)),
            activity_timeout: Duration::from_millis(
                self.activity_timeout.unwrap_or(DEFAULT_ACTIVITY_TIMEOUT),
            ),
            pong_timeout: Duration::from_millis(self.pong_timeout.unwrap_or(DEFAULT_PONG_TIMEOUT)),
        }
    }
}

/// Builder for PusherClient that handles initialization
pub struct PusherClientBuilder {
    options: PusherClientOptions,
    url: Url,
    transport: Option<Arc<dyn Transport>>,
    authorizer: Option<Arc<dyn Authorizer>>,
    backoff: Option<Arc<dyn BackoffPolicy>>,
}

impl PusherClientBuilder {
    /// Create a new builder
    pub fn new(options: PusherClientOptions) -> Result<Self> {
        // Validate app key is provided
        if options.app_key.trim().is_empty() {
            return Err(PusherError::Config("app key is required".to_string()));
        }
        let url = options.endpoint_url()?;

        Ok(Self {
            options,
            url,
            transport: None,
            authorizer: None,
            backoff: None,
        })
    }

    /// Replaces the WebSocket transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the HTTP authorizer derived from `auth_endpoint`
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Replaces the default exponential backoff between reconnect attempts
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Build the client and spawn the dispatch task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> PusherClient {
        let timeouts = self.options.timeouts();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport));
        let authorizer = self.authorizer.or_else(|| {
            self.options.auth_endpoint.as_ref().map(|endpoint| {
                let authorizer = self
                    .options
                    .auth_headers
                    .iter()
                    .fold(
                        HttpAuthorizer::new(endpoint.clone()).with_timeout(timeouts.timeout),
                        |auth, (name, value)| auth.with_header(name.clone(), value.clone()),
                    );
                Arc::new(authorizer) as Arc<dyn Authorizer>
            })
        });
        let backoff = self
            .backoff
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()));

        // Initialize state watcher channel
        let (state_tx, state_rx) = watch::channel(ConnectionState::Initialized);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let state = Arc::new(RwLock::new(ClientState::new(
            Timer::new(backoff),
            timeouts.activity_timeout,
            state_tx,
            queue_tx.clone(),
        )));
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&state),
            queue_tx.clone(),
            authorizer,
            timeouts.timeout,
        ));
        let connection = Arc::new(ConnectionManager::new(
            self.url.to_string(),
            transport,
            state,
            Arc::clone(&subscriptions),
            queue_tx,
            timeouts,
        ));

        spawn_dispatcher(Arc::downgrade(&connection), queue_rx);

        PusherClient {
            options: Arc::new(self.options),
            connection,
            subscriptions,
            state_rx,
        }
    }
}

/// Single consumer of the event queue; ends once the client is dropped
fn spawn_dispatcher(connection: Weak<ConnectionManager>, mut queue: mpsc::UnboundedReceiver<Inbound>) {
    tokio::spawn(async move {
        while let Some(item) = queue.recv().await {
            let Some(connection) = connection.upgrade() else {
                break;
            };
            connection.handle_inbound(item).await;
        }
        tracing::debug!("Dispatch task finished");
    });
}
