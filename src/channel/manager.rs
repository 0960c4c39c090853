use super::config::SubscribeData;
use super::core::PusherChannel;
use super::state::{
    BindingHandle, BindingScope, ChannelKind, EventBinding, EventCallback, EventFilter,
    SubscriptionState, invoke_all, matching_callbacks,
};
use crate::auth::{AuthorizationResponse, Authorizer};
use crate::client::state::{ClientState, Inbound};
use crate::encryption::{EncryptionModule, SharedSecret};
use crate::messaging::{ProtocolEvent, PusherEvent};
use crate::types::{
    CLIENT_EVENT_PREFIX, MAX_CHANNEL_NAME_LENGTH, PusherError, PusherMessage,
    RESERVED_EVENT_PREFIX, Result, channel_events,
};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

#[derive(Default)]
struct Registry {
    channels: Vec<Arc<PusherChannel>>,
    global: Vec<EventBinding>,
}

/// Owns the channel registry and global bindings, runs subscription handshakes and
/// dispatches routed events to handlers.
pub struct SubscriptionManager {
    client_state: Arc<RwLock<ClientState>>,
    registry: RwLock<Registry>,
    authorizer: Option<Arc<dyn Authorizer>>,
    auth_timeout: Duration,
    encryption: EncryptionModule,
    binding_ids: Arc<AtomicU64>,
    notifier: mpsc::UnboundedSender<Inbound>,
}

impl SubscriptionManager {
    pub(crate) fn new(
        client_state: Arc<RwLock<ClientState>>,
        notifier: mpsc::UnboundedSender<Inbound>,
        authorizer: Option<Arc<dyn Authorizer>>,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            client_state,
            registry: RwLock::new(Registry::default()),
            authorizer,
            auth_timeout,
            encryption: EncryptionModule::new(),
            binding_ids: Arc::new(AtomicU64::new(1)),
            notifier,
        }
    }

    pub async fn channel(&self, name: &str) -> Option<Arc<PusherChannel>> {
        self.registry
            .read()
            .await
            .channels
            .iter()
            .find(|channel| channel.name() == name)
            .cloned()
    }

    pub async fn channels(&self) -> Vec<Arc<PusherChannel>> {
        self.registry.read().await.channels.clone()
    }

    /// Registers `name` (once) and subscribes it if the connection is up.
    ///
    /// Subscribing a channel that is already Subscribing or Subscribed returns the existing
    /// channel without sending anything; a Failed channel is retried.
    pub async fn subscribe(&self, name: &str) -> Result<Arc<PusherChannel>> {
        validate_channel_name(name)?;

        let channel = {
            let mut registry = self.registry.write().await;
            match registry.channels.iter().find(|c| c.name() == name) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let channel = Arc::new(PusherChannel::new(name, Arc::clone(&self.binding_ids)));
                    registry.channels.push(Arc::clone(&channel));
                    tracing::info!("Registered channel '{}'", name);
                    channel
                }
            }
        };

        let generation = {
            let state = self.client_state.read().await;
            state.is_connected().then_some(state.generation)
        };
        match generation {
            Some(generation) => self.subscribe_channel(&channel, generation).await,
            None => tracing::debug!("Not connected, '{}' will subscribe on connect", name),
        }

        Ok(channel)
    }

    /// Subscribes every registered, unsubscribed channel on a fresh connection.
    ///
    /// Attempts run concurrently and are started in registration order, so channels that
    /// need no authorization go out in that order and a slow authorizer holds back only
    /// its own channel.
    pub(crate) async fn subscribe_pending(&self, generation: u64) {
        let mut pending = Vec::new();
        for channel in self.channels().await {
            if channel.state().await == SubscriptionState::Unsubscribed {
                pending.push(channel);
            }
        }
        join_all(
            pending
                .iter()
                .map(|channel| self.subscribe_channel(channel, generation)),
        )
        .await;
    }

    /// One subscription attempt on connection `generation`
    async fn subscribe_channel(&self, channel: &Arc<PusherChannel>, generation: u64) {
        let Some(socket_id) = self.live_socket_id(generation).await else {
            return;
        };
        if !channel.begin_subscribing().await {
            tracing::debug!("'{}' is already subscribing or subscribed", channel.name());
            return;
        }
        let name = channel.name();
        tracing::info!("Subscribing to '{}'", name);

        let grant = if channel.kind().requires_authorization() {
            match self.authorize(name, &socket_id).await {
                Ok(grant) => Some(grant),
                Err(e) => {
                    self.fail_subscription(channel, e).await;
                    return;
                }
            }
        } else {
            None
        };

        let secret = if channel.kind() == ChannelKind::PrivateEncrypted {
            let decoded = grant
                .as_ref()
                .and_then(|g| g.shared_secret.as_deref())
                .ok_or_else(|| PusherError::Authorization {
                    channel: name.to_string(),
                    message: "no shared_secret for encrypted channel".to_string(),
                })
                .and_then(|encoded| SharedSecret::from_base64(encoded).map_err(PusherError::from));
            match decoded {
                Ok(secret) => Some(secret),
                Err(e) => {
                    self.fail_subscription(channel, e).await;
                    return;
                }
            }
        } else {
            None
        };

        let (auth, channel_data) = match grant {
            Some(grant) => (Some(grant.auth), grant.channel_data),
            None => (None, None),
        };
        if channel.kind() == ChannelKind::Presence {
            match channel_data.as_deref() {
                Some(data) => channel.set_me(data).await,
                None => tracing::warn!("No channel_data for presence channel '{}'", name),
            }
        }

        // The connection or the registration may have changed while authorizing
        if self.live_socket_id(generation).await.is_none()
            || channel.state().await != SubscriptionState::Subscribing
            || !self.is_registered(channel).await
        {
            tracing::debug!("Subscription attempt for '{}' superseded", name);
            return;
        }

        if let Some(secret) = secret {
            self.encryption.register_key(name, secret).await;
        }

        let message = SubscribeData {
            channel: name.to_string(),
            auth,
            channel_data,
        }
        .into_message();
        let sent = match message {
            Ok(message) => self.client_state.read().await.send(&message),
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            tracing::warn!("Failed to send subscribe for '{}': {}", name, e);
            channel.abandon_subscribing().await;
        }
    }

    async fn authorize(&self, channel: &str, socket_id: &str) -> Result<AuthorizationResponse> {
        let authorizer = self
            .authorizer
            .as_ref()
            .ok_or_else(|| PusherError::Authorization {
                channel: channel.to_string(),
                message: "no authorizer configured".to_string(),
            })?;
        tokio::time::timeout(self.auth_timeout, authorizer.authorize(channel, socket_id))
            .await
            .map_err(|_| PusherError::Authorization {
                channel: channel.to_string(),
                message: format!("authorizer did not answer within {:?}", self.auth_timeout),
            })?
    }

    async fn fail_subscription(&self, channel: &PusherChannel, error: PusherError) {
        if !channel.fail_subscribing().await {
            return;
        }
        tracing::error!("Subscription to '{}' failed: {}", channel.name(), error);
        let event = PusherEvent::local(
            channel_events::SUBSCRIPTION_ERROR,
            Some(channel.name()),
            serde_json::json!({
                "type": "AuthError",
                "error": error.to_string(),
            }),
        );
        let _ = self.notifier.send(Inbound::Channel(event));
    }

    async fn live_socket_id(&self, generation: u64) -> Option<String> {
        let state = self.client_state.read().await;
        if state.generation != generation || !state.is_connected() {
            return None;
        }
        state.socket_id.clone()
    }

    async fn is_registered(&self, channel: &Arc<PusherChannel>) -> bool {
        self.registry
            .read()
            .await
            .channels
            .iter()
            .any(|c| Arc::ptr_eq(c, channel))
    }

    /// Connection lost: every live subscription must be re-established later
    pub(crate) async fn reset_on_disconnect(&self) {
        for channel in self.channels().await {
            channel.reset_on_disconnect().await;
        }
    }

    /// Removes `name` from the registry, dropping its bindings and members.
    ///
    /// Sends `pusher:unsubscribe` if a subscription was live; unknown names are a no-op.
    pub async fn unsubscribe(&self, name: &str) -> Result<()> {
        let channel = {
            let mut registry = self.registry.write().await;
            let Some(index) = registry.channels.iter().position(|c| c.name() == name) else {
                tracing::debug!("Unsubscribe for unknown channel '{}'", name);
                return Ok(());
            };
            registry.channels.remove(index)
        };

        let previous = channel.discard().await;
        self.encryption.remove_key(name).await;

        if matches!(
            previous,
            SubscriptionState::Subscribing | SubscriptionState::Subscribed
        ) {
            let state = self.client_state.read().await;
            if state.is_connected() {
                state.send(&PusherMessage::unsubscribe(name))?;
            }
        }
        tracing::info!("Unsubscribed from '{}'", name);
        Ok(())
    }

    pub async fn bind_global(&self, filter: EventFilter, callback: EventCallback) -> BindingHandle {
        let id = self.binding_ids.fetch_add(1, Ordering::Relaxed);
        self.registry.write().await.global.push(EventBinding {
            id,
            filter,
            callback,
        });
        BindingHandle {
            scope: BindingScope::Global,
            id,
        }
    }

    pub async fn unbind(&self, handle: &BindingHandle) -> bool {
        match &handle.scope {
            BindingScope::Global => {
                let mut registry = self.registry.write().await;
                let before = registry.global.len();
                registry.global.retain(|binding| binding.id != handle.id);
                registry.global.len() != before
            }
            BindingScope::Channel(name) => match self.channel(name).await {
                Some(channel) => channel.unbind(handle).await,
                None => false,
            },
        }
    }

    /// Sends a `client-*` event on a subscribed private or presence channel
    pub async fn trigger(&self, channel: &str, event: &str, data: serde_json::Value) -> Result<()> {
        if !event.starts_with(CLIENT_EVENT_PREFIX) {
            return Err(PusherError::ClientEvent(format!(
                "'{}' must start with '{}'",
                event, CLIENT_EVENT_PREFIX
            )));
        }
        let target = self
            .channel(channel)
            .await
            .ok_or_else(|| PusherError::InvalidChannel(format!("not subscribed to '{}'", channel)))?;
        if !target.kind().allows_client_events() {
            return Err(PusherError::ClientEvent(format!(
                "client events are not allowed on '{}'",
                channel
            )));
        }
        if !target.is_subscribed().await {
            return Err(PusherError::ClientEvent(format!(
                "'{}' is not subscribed yet",
                channel
            )));
        }

        let state = self.client_state.read().await;
        if !state.is_connected() {
            return Err(PusherError::NotConnected);
        }
        state.send(&PusherMessage::new(event, data).with_channel(channel))
    }

    /// Applies protocol bookkeeping to a routed event and delivers it.
    ///
    /// Internal events are re-tagged to their public names; payloads on encrypted channels
    /// are decrypted first and dropped (with a `pusher:decryption_error` to global handlers)
    /// if that fails. Channel handlers run before global handlers.
    pub async fn dispatch(&self, event: PusherEvent) {
        let Some(name) = event.channel().map(str::to_string) else {
            self.dispatch_global(&event).await;
            return;
        };
        let channel = self.channel(&name).await;

        let event = match event.kind() {
            ProtocolEvent::SubscriptionSucceeded => {
                let Some(channel) = &channel else {
                    tracing::debug!("subscription_succeeded for unregistered '{}'", name);
                    return;
                };
                if !channel.complete_subscription(&event).await {
                    return;
                }
                tracing::info!("Subscribed to '{}'", name);
                event.retagged(channel_events::SUBSCRIPTION_SUCCEEDED)
            }
            kind @ (ProtocolEvent::MemberAdded
            | ProtocolEvent::MemberRemoved
            | ProtocolEvent::MemberUpdated) => {
                if let Some(channel) = &channel {
                    channel.apply_member_event(&event).await;
                }
                event.retagged(kind.as_str())
            }
            _ if ChannelKind::from_name(&name) == ChannelKind::PrivateEncrypted
                && !event.name().starts_with(RESERVED_EVENT_PREFIX) =>
            {
                match self.encryption.decrypt(&name, &event).await {
                    Ok(decrypted) => decrypted,
                    Err(e) => {
                        tracing::warn!(
                            "Dropping '{}' on '{}': {}",
                            event.name(),
                            name,
                            e
                        );
                        let notice = PusherEvent::local(
                            channel_events::DECRYPTION_ERROR,
                            Some(&name),
                            serde_json::json!({
                                "event": event.name(),
                                "error": e.to_string(),
                            }),
                        );
                        self.dispatch_global(&notice).await;
                        return;
                    }
                }
            }
            _ => event,
        };

        if let Some(channel) = channel {
            invoke_all(&channel.handlers_for(event.name()).await, &event);
        }
        self.dispatch_global(&event).await;
    }

    pub async fn dispatch_global(&self, event: &PusherEvent) {
        let callbacks = matching_callbacks(&self.registry.read().await.global, event.name());
        invoke_all(&callbacks, event);
    }
}

fn validate_channel_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PusherError::InvalidChannel(
            "channel name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err(PusherError::InvalidChannel(format!(
            "channel name longer than {} characters",
            MAX_CHANNEL_NAME_LENGTH
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "_-=@,.;".contains(*c)))
    {
        return Err(PusherError::InvalidChannel(format!(
            "invalid character {:?} in '{}'",
            bad, name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionState;
    use crate::encryption::encrypted_frame;
    use crate::infrastructure::Timer;
    use crate::test_support::MockAuthorizer;
    use crate::websocket::OutboundFrame;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    const KEY: [u8; 32] = [42; 32];
    const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

    struct Harness {
        manager: SubscriptionManager,
        state: Arc<RwLock<ClientState>>,
        written: mpsc::UnboundedReceiver<OutboundFrame>,
        queue: mpsc::UnboundedReceiver<Inbound>,
        _state_rx: watch::Receiver<ConnectionState>,
    }

    impl Harness {
        async fn connected(authorizer: Option<Arc<dyn Authorizer>>) -> Self {
            let (state_tx, state_rx) = watch::channel(ConnectionState::Initialized);
            let (notifier, queue) = mpsc::unbounded_channel();
            let (outbound, written) = mpsc::unbounded_channel();
            let mut client_state = ClientState::new(
                Timer::default(),
                Duration::from_secs(120),
                state_tx,
                notifier.clone(),
            );
            client_state.generation = 1;
            client_state.socket_id = Some("123.456".into());
            client_state.outbound = Some(outbound);
            client_state.set_connection_state(ConnectionState::Connected);
            let state = Arc::new(RwLock::new(client_state));
            let manager = SubscriptionManager::new(
                Arc::clone(&state),
                notifier,
                authorizer,
                AUTH_TIMEOUT,
            );
            Self {
                manager,
                state,
                written,
                queue,
                _state_rx: state_rx,
            }
        }

        fn sent(&mut self) -> Vec<serde_json::Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.written.try_recv() {
                if let OutboundFrame::Text(text) = frame {
                    frames.push(serde_json::from_str(&text).unwrap());
                }
            }
            frames
        }

        fn channel_notices(&mut self) -> Vec<PusherEvent> {
            let mut events = Vec::new();
            while let Ok(item) = self.queue.try_recv() {
                if let Inbound::Channel(event) = item {
                    events.push(event);
                }
            }
            events
        }
    }

    fn event(text: &str) -> PusherEvent {
        PusherEvent::parse(text).unwrap()
    }

    fn succeeded(channel: &str) -> PusherEvent {
        event(&format!(
            r#"{{"event":"pusher_internal:subscription_succeeded","channel":"{channel}","data":"{{}}"}}"#
        ))
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, EventCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let callback: EventCallback = Arc::new(move |e: &PusherEvent| {
            log.lock()
                .unwrap()
                .push(format!("{}:{}", e.name(), e.data().unwrap_or_default()))
        });
        (seen, callback)
    }

    #[test]
    fn test_channel_name_validation() {
        assert!(validate_channel_name("private-orders_2024=a@b,c.d;e").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("has space").is_err());
        assert!(validate_channel_name(&"a".repeat(164)).is_ok());
        assert!(validate_channel_name(&"a".repeat(165)).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_public_sends_frame_once() {
        let mut h = Harness::connected(None).await;

        let channel = h.manager.subscribe("orders").await.unwrap();
        assert_eq!(channel.state().await, SubscriptionState::Subscribing);
        h.manager.subscribe("orders").await.unwrap();

        let frames = h.sent();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "pusher:subscribe");
        assert_eq!(frames[0]["data"]["channel"], "orders");
        assert!(frames[0]["data"].get("auth").is_none());
        assert_eq!(h.manager.channels().await.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_while_disconnected_defers() {
        let mut h = Harness::connected(None).await;
        h.state
            .write()
            .await
            .set_connection_state(ConnectionState::Disconnected);

        let channel = h.manager.subscribe("orders").await.unwrap();
        assert_eq!(channel.state().await, SubscriptionState::Unsubscribed);
        assert!(h.sent().is_empty());

        h.state
            .write()
            .await
            .set_connection_state(ConnectionState::Connected);
        h.manager.subscribe_pending(1).await;
        assert_eq!(h.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_private_subscribe_uses_authorizer() {
        let authorizer = Arc::new(MockAuthorizer::granting(
            AuthorizationResponse::new("key:sig"),
        ));
        let mut h = Harness::connected(Some(authorizer.clone())).await;

        h.manager.subscribe("private-orders").await.unwrap();

        assert_eq!(
            authorizer.requests(),
            vec![("private-orders".to_string(), "123.456".to_string())]
        );
        let frames = h.sent();
        assert_eq!(frames[0]["data"]["auth"], "key:sig");
    }

    #[tokio::test]
    async fn test_authorization_failure_marks_failed() {
        let mut h = Harness::connected(Some(Arc::new(MockAuthorizer::denying("forbidden")))).await;

        let channel = h.manager.subscribe("private-orders").await.unwrap();

        assert_eq!(channel.state().await, SubscriptionState::Failed);
        assert!(h.sent().is_empty());
        let notices = h.channel_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].name(), "pusher:subscription_error");
        assert_eq!(notices[0].channel(), Some("private-orders"));
        assert!(notices[0].data().unwrap().contains("forbidden"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_authorizer_does_not_hold_back_other_channels() {
        let authorizer = Arc::new(MockAuthorizer::granting(AuthorizationResponse::new("k:s")));
        let _gate = authorizer.hold();
        let mut h = Harness::connected(Some(authorizer)).await;
        h.state
            .write()
            .await
            .set_connection_state(ConnectionState::Disconnected);
        let private = h.manager.subscribe("private-a").await.unwrap();
        let public = h.manager.subscribe("b").await.unwrap();
        h.state
            .write()
            .await
            .set_connection_state(ConnectionState::Connected);
        h.channel_notices();

        {
            let pending = h.manager.subscribe_pending(1);
            tokio::pin!(pending);
            tokio::select! {
                _ = &mut pending => panic!("stalled authorization finished early"),
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            let mut channels = Vec::new();
            while let Ok(OutboundFrame::Text(text)) = h.written.try_recv() {
                let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
                channels.push(frame["data"]["channel"].as_str().unwrap().to_string());
            }
            assert_eq!(channels, vec!["b"]);
            assert_eq!(public.state().await, SubscriptionState::Subscribing);
            assert_eq!(private.state().await, SubscriptionState::Subscribing);

            let started = tokio::time::Instant::now();
            pending.await;
            assert!(started.elapsed() >= AUTH_TIMEOUT - Duration::from_secs(1));
        }
        assert_eq!(private.state().await, SubscriptionState::Failed);
        let notices = h.channel_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].channel(), Some("private-a"));
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_private_without_authorizer_fails() {
        let mut h = Harness::connected(None).await;
        let channel = h.manager.subscribe("presence-lobby").await.unwrap();
        assert_eq!(channel.state().await, SubscriptionState::Failed);
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_encrypted_without_shared_secret_fails() {
        let authorizer = Arc::new(MockAuthorizer::granting(AuthorizationResponse::new("k:s")));
        let mut h = Harness::connected(Some(authorizer)).await;

        let channel = h.manager.subscribe("private-encrypted-vault").await.unwrap();

        assert_eq!(channel.state().await, SubscriptionState::Failed);
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_presence_flow() {
        let authorizer = Arc::new(MockAuthorizer::granting(
            AuthorizationResponse::new("k:s").with_channel_data(r#"{"user_id":"a"}"#),
        ));
        let mut h = Harness::connected(Some(authorizer)).await;
        let channel = h.manager.subscribe("presence-lobby").await.unwrap();
        assert_eq!(
            h.sent()[0]["data"]["channel_data"],
            r#"{"user_id":"a"}"#
        );

        let (seen, callback) = recorder();
        channel
            .bind("pusher:member_added", move |e| callback(e))
            .await;

        let data = r#"{\"presence\":{\"ids\":[\"a\",\"b\"],\"hash\":{\"a\":{},\"b\":{}},\"count\":2}}"#;
        h.manager
            .dispatch(event(&format!(
                r#"{{"event":"pusher_internal:subscription_succeeded","channel":"presence-lobby","data":"{data}"}}"#
            )))
            .await;
        h.manager
            .dispatch(event(
                r#"{"event":"pusher_internal:member_removed","channel":"presence-lobby","data":"{\"user_id\":\"a\"}"}"#,
            ))
            .await;
        h.manager
            .dispatch(event(
                r#"{"event":"pusher_internal:member_added","channel":"presence-lobby","data":"{\"user_id\":\"c\",\"user_info\":{}}"}"#,
            ))
            .await;

        let mut ids: Vec<String> = channel.members().await.unwrap().keys().cloned().collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(channel.is_subscribed().await);
        assert!(channel.me().await.is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(seen.lock().unwrap()[0].starts_with("pusher:member_added:"));
    }

    #[tokio::test]
    async fn test_dispatch_order_channel_then_global() {
        let h = Harness::connected(None).await;
        let channel = h.manager.subscribe("orders").await.unwrap();
        h.manager.dispatch(succeeded("orders")).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&order);
        h.manager
            .bind_global(EventFilter::Any, Arc::new(move |e: &PusherEvent| {
                log.lock().unwrap().push(format!("global:{}", e.name()))
            }))
            .await;
        let log = Arc::clone(&order);
        channel
            .bind("created", move |e| log.lock().unwrap().push(format!("named:{}", e.name())))
            .await;
        let log = Arc::clone(&order);
        channel
            .bind_all(move |e| log.lock().unwrap().push(format!("all:{}", e.name())))
            .await;

        h.manager
            .dispatch(event(r#"{"event":"created","channel":"orders","data":"1"}"#))
            .await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["named:created", "all:created", "global:created"]
        );
    }

    #[tokio::test]
    async fn test_subscription_succeeded_is_retagged() {
        let h = Harness::connected(None).await;
        let channel = h.manager.subscribe("orders").await.unwrap();
        let (seen, callback) = recorder();
        channel.bind_all(move |e| callback(e)).await;

        h.manager.dispatch(succeeded("orders")).await;

        assert_eq!(*seen.lock().unwrap(), vec!["pusher:subscription_succeeded:{}"]);
    }

    #[tokio::test]
    async fn test_unregistered_channel_reaches_global_only() {
        let h = Harness::connected(None).await;
        let (seen, callback) = recorder();
        h.manager.bind_global(EventFilter::Any, callback).await;

        h.manager
            .dispatch(event(r#"{"event":"x","channel":"nobody","data":"1"}"#))
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["x:1"]);
    }

    async fn encrypted_harness() -> (Harness, Arc<PusherChannel>) {
        use base64::Engine;
        let secret = base64::engine::general_purpose::STANDARD.encode(KEY);
        let authorizer = Arc::new(MockAuthorizer::granting(
            AuthorizationResponse::new("k:s").with_shared_secret(secret),
        ));
        let h = Harness::connected(Some(authorizer)).await;
        let channel = h.manager.subscribe("private-encrypted-vault").await.unwrap();
        h.manager.dispatch(succeeded("private-encrypted-vault")).await;
        (h, channel)
    }

    #[tokio::test]
    async fn test_encrypted_payload_is_decrypted() {
        let (h, channel) = encrypted_harness().await;
        let (seen, callback) = recorder();
        channel.bind("secret", move |e| callback(e)).await;

        let frame = encrypted_frame(KEY, "secret", "private-encrypted-vault", r#"{"a":1}"#);
        h.manager.dispatch(event(&frame)).await;

        assert!(channel.is_subscribed().await);
        assert_eq!(*seen.lock().unwrap(), vec![r#"secret:{"a":1}"#]);
    }

    #[tokio::test]
    async fn test_wrong_key_never_reaches_handlers() {
        let (h, channel) = encrypted_harness().await;
        let (channel_seen, callback) = recorder();
        channel.bind_all(move |e| callback(e)).await;
        let (global_seen, callback) = recorder();
        h.manager.bind_global(EventFilter::Any, callback).await;

        let frame = encrypted_frame([1; 32], "secret", "private-encrypted-vault", "hidden");
        h.manager.dispatch(event(&frame)).await;

        assert!(channel_seen.lock().unwrap().is_empty());
        let global = global_seen.lock().unwrap();
        assert_eq!(global.len(), 1);
        assert!(global[0].starts_with("pusher:decryption_error:"));
        assert!(!global[0].contains("hidden"));
    }

    #[tokio::test]
    async fn test_unsubscribe_sends_frame_and_forgets_channel() {
        let (mut h, _channel) = encrypted_harness().await;
        h.sent();

        h.manager.unsubscribe("private-encrypted-vault").await.unwrap();

        let frames = h.sent();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "pusher:unsubscribe");
        assert_eq!(frames[0]["data"]["channel"], "private-encrypted-vault");
        assert!(h.manager.channel("private-encrypted-vault").await.is_none());

        // Unknown channel is a no-op
        h.manager.unsubscribe("private-encrypted-vault").await.unwrap();
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_during_authorization_abandons_attempt() {
        let authorizer = Arc::new(MockAuthorizer::granting(AuthorizationResponse::new("k:s")));
        let gate = authorizer.hold();
        let h = Harness::connected(Some(authorizer)).await;
        let manager = Arc::new(h.manager);

        let subscribing = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.subscribe("private-orders").await.unwrap() }
        });
        tokio::task::yield_now().await;
        manager.unsubscribe("private-orders").await.unwrap();
        gate.notify_one();
        let channel = subscribing.await.unwrap();

        let mut written = h.written;
        assert!(written.try_recv().is_err());
        assert_eq!(channel.state().await, SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_trigger_rules() {
        let authorizer = Arc::new(MockAuthorizer::granting(AuthorizationResponse::new("k:s")));
        let mut h = Harness::connected(Some(authorizer)).await;
        h.manager.subscribe("private-chat").await.unwrap();
        h.manager.subscribe("orders").await.unwrap();
        h.sent();

        let data = serde_json::json!({"text": "hi"});
        assert!(matches!(
            h.manager.trigger("private-chat", "client-typing", data.clone()).await,
            Err(PusherError::ClientEvent(_))
        ));

        h.manager.dispatch(succeeded("private-chat")).await;
        h.manager.dispatch(succeeded("orders")).await;

        assert!(matches!(
            h.manager.trigger("private-chat", "typing", data.clone()).await,
            Err(PusherError::ClientEvent(_))
        ));
        assert!(matches!(
            h.manager.trigger("orders", "client-typing", data.clone()).await,
            Err(PusherError::ClientEvent(_))
        ));
        assert!(matches!(
            h.manager.trigger("private-nope", "client-typing", data.clone()).await,
            Err(PusherError::InvalidChannel(_))
        ));

        h.manager
            .trigger("private-chat", "client-typing", data)
            .await
            .unwrap();
        let frames = h.sent();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "client-typing");
        assert_eq!(frames[0]["channel"], "private-chat");
        assert_eq!(frames[0]["data"]["text"], "hi");
    }

    #[tokio::test]
    async fn test_reset_on_disconnect_allows_resubscribe() {
        let mut h = Harness::connected(None).await;
        let channel = h.manager.subscribe("orders").await.unwrap();
        h.manager.dispatch(succeeded("orders")).await;
        h.sent();

        h.manager.reset_on_disconnect().await;
        assert_eq!(channel.state().await, SubscriptionState::Unsubscribed);

        {
            let mut state = h.state.write().await;
            state.generation = 2;
        }
        h.manager.subscribe_pending(2).await;
        assert_eq!(h.sent().len(), 1);
        assert_eq!(channel.state().await, SubscriptionState::Subscribing);
    }

    #[tokio::test]
    async fn test_unbind_global() {
        let h = Harness::connected(None).await;
        let (seen, callback) = recorder();
        let handle = h.manager.bind_global(EventFilter::Named("x".into()), callback).await;

        assert!(h.manager.unbind(&handle).await);
        h.manager.dispatch_global(&event(r#"{"event":"x"}"#)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(!h.manager.unbind(&handle).await);
    }
}
