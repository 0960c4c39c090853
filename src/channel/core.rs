use super::presence::{MemberSnapshot, PresenceMember};
use super::state::{
    BindingHandle, BindingScope, ChannelKind, ChannelState, EventBinding, EventCallback,
    EventFilter, SubscriptionState, matching_callbacks,
};
use crate::messaging::PusherEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// A named stream of events on the broker.
///
/// Channels are created by [`PusherClient::subscribe`](crate::PusherClient::subscribe) and
/// live in the client's registry until they are unsubscribed. The channel kind follows from
/// the name prefix:
/// - `private-encrypted-*`: authorized, payloads decrypted before delivery
/// - `private-*`: authorized
/// - `presence-*`: authorized, with a live member set
/// - anything else: public
///
/// # Example
///
/// ```no_run
/// use pusher_channels_rs::{PusherClient, PusherClientOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PusherClient::new(PusherClientOptions {
///     app_key: "your-app-key".to_string(),
///     ..Default::default()
/// })?;
/// client.connect().await;
///
/// let channel = client.subscribe("orders").await?;
/// channel
///     .bind("order-created", |event| {
///         println!("new order: {:?}", event.data());
///     })
///     .await;
/// # Ok(())
/// # }
/// ```
pub struct PusherChannel {
    name: String,
    kind: ChannelKind,
    pub(crate) state: RwLock<ChannelState>,
    binding_ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for PusherChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PusherChannel")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PusherChannel {
    pub(crate) fn new(name: impl Into<String>, binding_ids: Arc<AtomicU64>) -> Self {
        let name = name.into();
        let kind = ChannelKind::from_name(&name);
        Self {
            name,
            kind,
            state: RwLock::new(ChannelState::new(kind)),
            binding_ids,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub async fn state(&self) -> SubscriptionState {
        self.state.read().await.status
    }

    pub async fn is_subscribed(&self) -> bool {
        self.state().await == SubscriptionState::Subscribed
    }

    /// Registers `callback` for events named `event` on this channel.
    ///
    /// Names are matched after re-tagging, so presence handlers bind to
    /// `pusher:member_added` rather than the broker's internal name. Bindings survive
    /// reconnects and are only dropped by [`unbind`](Self::unbind) or unsubscribing.
    pub async fn bind<F>(&self, event: impl Into<String>, callback: F) -> BindingHandle
    where
        F: Fn(&PusherEvent) + Send + Sync + 'static,
    {
        self.add_binding(EventFilter::Named(event.into()), Arc::new(callback))
            .await
    }

    /// Registers `callback` for every event delivered on this channel
    pub async fn bind_all<F>(&self, callback: F) -> BindingHandle
    where
        F: Fn(&PusherEvent) + Send + Sync + 'static,
    {
        self.add_binding(EventFilter::Any, Arc::new(callback)).await
    }

    /// Removes the binding behind `handle`; returns `false` if it was not registered here
    pub async fn unbind(&self, handle: &BindingHandle) -> bool {
        if handle.scope != BindingScope::Channel(self.name.clone()) {
            return false;
        }
        let mut state = self.state.write().await;
        let before = state.bindings.len();
        state.bindings.retain(|binding| binding.id != handle.id);
        state.bindings.len() != before
    }

    /// Immutable snapshot of the member set (presence channels only)
    pub async fn members(&self) -> Option<MemberSnapshot> {
        self.state
            .read()
            .await
            .variant
            .presence()
            .map(|tracker| tracker.snapshot())
    }

    pub async fn member(&self, id: &str) -> Option<PresenceMember> {
        self.state
            .read()
            .await
            .variant
            .presence()
            .and_then(|tracker| tracker.get(id).cloned())
    }

    pub async fn member_count(&self) -> Option<usize> {
        self.state
            .read()
            .await
            .variant
            .presence()
            .map(|tracker| tracker.count())
    }

    /// The local member, once its id is known and it appears in the member set
    pub async fn me(&self) -> Option<PresenceMember> {
        let state = self.state.read().await;
        let tracker = state.variant.presence()?;
        tracker.me().and_then(|id| tracker.get(id)).cloned()
    }

    async fn add_binding(&self, filter: EventFilter, callback: EventCallback) -> BindingHandle {
        let id = self.binding_ids.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Binding {:?} on channel '{}'", filter, self.name);
        self.state.write().await.bindings.push(EventBinding {
            id,
            filter,
            callback,
        });
        BindingHandle {
            scope: BindingScope::Channel(self.name.clone()),
            id,
        }
    }

    pub(crate) async fn handlers_for(&self, event_name: &str) -> Vec<EventCallback> {
        matching_callbacks(&self.state.read().await.bindings, event_name)
    }

    /// Moves Unsubscribed or Failed to Subscribing; `false` if an attempt is live or done
    pub(crate) async fn begin_subscribing(&self) -> bool {
        let mut state = self.state.write().await;
        match state.status {
            SubscriptionState::Unsubscribed | SubscriptionState::Failed => {
                state.status = SubscriptionState::Subscribing;
                true
            }
            SubscriptionState::Subscribing | SubscriptionState::Subscribed => false,
        }
    }

    /// Marks a live attempt as failed; ignored if the attempt was already superseded
    pub(crate) async fn fail_subscribing(&self) -> bool {
        let mut state = self.state.write().await;
        if state.status != SubscriptionState::Subscribing {
            return false;
        }
        state.status = SubscriptionState::Failed;
        true
    }

    /// Returns a live attempt to Unsubscribed so the next connection retries it
    pub(crate) async fn abandon_subscribing(&self) {
        let mut state = self.state.write().await;
        if state.status == SubscriptionState::Subscribing {
            state.status = SubscriptionState::Unsubscribed;
        }
    }

    /// Applies `subscription_succeeded`, seeding presence; `false` if no attempt was live
    pub(crate) async fn complete_subscription(&self, event: &PusherEvent) -> bool {
        let mut state = self.state.write().await;
        if state.status != SubscriptionState::Subscribing {
            tracing::debug!(
                "Ignoring subscription_succeeded for '{}' in state {:?}",
                self.name,
                state.status
            );
            return false;
        }
        if let Some(tracker) = state.variant.presence_mut() {
            tracker.seed(event);
        }
        state.status = SubscriptionState::Subscribed;
        true
    }

    pub(crate) async fn apply_member_event(&self, event: &PusherEvent) {
        let mut state = self.state.write().await;
        match state.variant.presence_mut() {
            Some(tracker) => {
                if let Some(change) = tracker.apply(event) {
                    tracing::debug!("Presence change on '{}': {:?}", self.name, change);
                }
            }
            None => tracing::warn!(
                "Member event '{}' on non-presence channel '{}'",
                event.name(),
                self.name
            ),
        }
    }

    pub(crate) async fn set_me(&self, channel_data: &str) {
        if let Some(tracker) = self.state.write().await.variant.presence_mut() {
            tracker.set_me_from_channel_data(channel_data);
        }
    }

    /// Connection lost: the subscription must be re-established, members are stale
    pub(crate) async fn reset_on_disconnect(&self) {
        let mut state = self.state.write().await;
        if matches!(
            state.status,
            SubscriptionState::Subscribing | SubscriptionState::Subscribed
        ) {
            state.status = SubscriptionState::Unsubscribed;
        }
        if let Some(tracker) = state.variant.presence_mut() {
            tracker.clear();
        }
    }

    /// Final teardown on unsubscribe; returns the status it was in
    pub(crate) async fn discard(&self) -> SubscriptionState {
        let mut state = self.state.write().await;
        let previous = state.status;
        state.status = SubscriptionState::Unsubscribed;
        state.bindings.clear();
        if let Some(tracker) = state.variant.presence_mut() {
            tracker.clear();
        }
        previous
    }
}
