use super::{ConnectionManager, ConnectionState, PusherClientBuilder, PusherClientOptions};
use crate::channel::{
    BindingHandle, BindingScope, EventFilter, PusherChannel, SubscriptionManager,
};
use crate::messaging::PusherEvent;
use crate::types::{PusherError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The main entry point for interacting with a Pusher Channels broker.
///
/// `PusherClient` manages the WebSocket connection, reconnects with backoff when it drops,
/// and keeps the registry of subscribed channels. Channels registered while disconnected
/// are subscribed as soon as the connection is established, and every registered channel is
/// re-subscribed after a reconnect.
///
/// The client is a cheap handle; clones share the same connection.
///
/// # Example
///
/// ```no_run
/// use pusher_channels_rs::{PusherClient, PusherClientOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PusherClient::new(PusherClientOptions {
///     app_key: "your-app-key".to_string(),
///     cluster: Some("eu".to_string()),
///     ..Default::default()
/// })?;
///
/// client.connect().await;
/// // Use the client...
/// client.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PusherClient {
    pub(crate) options: Arc<PusherClientOptions>,

    // Connection lifecycle
    pub(crate) connection: Arc<ConnectionManager>,

    // Channel registry and dispatch
    pub(crate) subscriptions: Arc<SubscriptionManager>,

    pub(crate) state_rx: watch::Receiver<ConnectionState>,
}

impl PusherClient {
    /// Creates a new PusherClient instance.
    ///
    /// This initializes the client but does not establish a connection. You must call
    /// [`connect()`](Self::connect) to establish the WebSocket connection. If
    /// `auth_endpoint` is set, private and presence channels are authorized by POSTing to it.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Config`] if the app key is empty, or
    /// [`PusherError::UrlParse`] if the host does not form a valid URL.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pusher_channels_rs::{PusherClient, PusherClientOptions};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = PusherClient::new(PusherClientOptions {
    ///     app_key: "your-app-key".to_string(),
    ///     auth_endpoint: Some("https://example.com/pusher/auth".to_string()),
    ///     ..Default::default()
    /// })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(options: PusherClientOptions) -> Result<Self> {
        PusherClientBuilder::new(options).map(|builder| builder.build())
    }

    /// Starts a builder, for custom transports, authorizers or backoff policies
    pub fn builder(options: PusherClientOptions) -> Result<PusherClientBuilder> {
        PusherClientBuilder::new(options)
    }

    pub fn options(&self) -> &PusherClientOptions {
        &self.options
    }

    /// Broker URL this client connects to
    pub fn url(&self) -> &str {
        self.connection.url()
    }

    /// Starts connecting in the background.
    ///
    /// Failures are retried with backoff rather than reported here; observe progress with
    /// [`state_changes`](Self::state_changes) or [`wait_for_state`](Self::wait_for_state).
    /// Calling this while connected or connecting does nothing.
    pub async fn connect(&self) {
        self.connection.connect().await;
    }

    /// Closes the connection and stops automatic reconnection until the next `connect`
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    pub async fn state(&self) -> ConnectionState {
        self.connection.state().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Broker-assigned id of the current connection
    pub async fn socket_id(&self) -> Option<String> {
        self.connection.socket_id().await
    }

    /// Watch channel following the connection state
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Waits until the connection reaches `target`
    ///
    /// # Errors
    ///
    /// [`PusherError::Timeout`] if `target` is not reached within `timeout`.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        tokio::time::timeout(timeout, state_rx.wait_for(|state| *state == target))
            .await
            .map_err(|_| PusherError::Timeout)?
            .map_err(|_| PusherError::NotConnected)?;
        Ok(())
    }

    /// Registers a channel and subscribes to it.
    ///
    /// Returns immediately with the channel handle; the subscription completes once the
    /// broker confirms it (`pusher:subscription_succeeded` on the channel). Subscribing the
    /// same name again returns the same channel.
    ///
    /// # Errors
    ///
    /// [`PusherError::InvalidChannel`] for empty, over-long or malformed names. Authorization
    /// failures are reported as `pusher:subscription_error` on the channel, not here.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use pusher_channels_rs::{PusherClient, PusherClientOptions};
    ///
    /// # async fn example(client: PusherClient) -> Result<(), Box<dyn std::error::Error>> {
    /// let channel = client.subscribe("presence-lobby").await?;
    /// channel
    ///     .bind("pusher:subscription_succeeded", |_| println!("joined"))
    ///     .await;
    /// channel
    ///     .bind("pusher:member_added", |event| println!("joined: {:?}", event.data()))
    ///     .await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn subscribe(&self, channel: &str) -> Result<Arc<PusherChannel>> {
        self.subscriptions.subscribe(channel).await
    }

    /// Drops a channel with its bindings; unknown names are ignored
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.subscriptions.unsubscribe(channel).await
    }

    pub async fn channel(&self, name: &str) -> Option<Arc<PusherChannel>> {
        self.subscriptions.channel(name).await
    }

    /// All registered channels, in registration order
    pub async fn channels(&self) -> Vec<Arc<PusherChannel>> {
        self.subscriptions.channels().await
    }

    /// Registers `callback` for `event` in `scope`
    ///
    /// # Errors
    ///
    /// [`PusherError::InvalidChannel`] if a channel scope names an unregistered channel.
    pub async fn bind<F>(
        &self,
        scope: BindingScope,
        event: impl Into<String>,
        callback: F,
    ) -> Result<BindingHandle>
    where
        F: Fn(&PusherEvent) + Send + Sync + 'static,
    {
        match scope {
            BindingScope::Global => Ok(self.bind_global(event, callback).await),
            BindingScope::Channel(name) => {
                let channel = self.channel(&name).await.ok_or_else(|| {
                    PusherError::InvalidChannel(format!("not subscribed to '{}'", name))
                })?;
                Ok(channel.bind(event, callback).await)
            }
        }
    }

    /// Registers `callback` for `event` on every channel and for connection-level events
    pub async fn bind_global<F>(&self, event: impl Into<String>, callback: F) -> BindingHandle
    where
        F: Fn(&PusherEvent) + Send + Sync + 'static,
    {
        self.subscriptions
            .bind_global(EventFilter::Named(event.into()), Arc::new(callback))
            .await
    }

    /// Registers `callback` for every event the client delivers
    pub async fn bind_all_global<F>(&self, callback: F) -> BindingHandle
    where
        F: Fn(&PusherEvent) + Send + Sync + 'static,
    {
        self.subscriptions
            .bind_global(EventFilter::Any, Arc::new(callback))
            .await
    }

    /// Removes exactly the registration behind `handle`
    pub async fn unbind(&self, handle: &BindingHandle) -> bool {
        self.subscriptions.unbind(handle).await
    }

    /// Sends a client event to the other subscribers of a private or presence channel.
    ///
    /// # Errors
    ///
    /// - [`PusherError::ClientEvent`] if `event` lacks the `client-` prefix, the channel
    ///   kind does not allow client events, or the subscription is not confirmed yet
    /// - [`PusherError::InvalidChannel`] if the channel is not registered
    /// - [`PusherError::NotConnected`] without a live connection
    pub async fn trigger<T: Serialize>(&self, channel: &str, event: &str, data: T) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.subscriptions.trigger(channel, event, data).await
    }
}
