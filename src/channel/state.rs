use super::presence::PresenceTracker;
use crate::messaging::PusherEvent;
use crate::types::constants::channel_prefixes;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Subscription lifecycle of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
    Failed,
}

/// Trust/visibility class, derived from the channel name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Public,
    Private,
    Presence,
    PrivateEncrypted,
}

impl ChannelKind {
    pub fn from_name(name: &str) -> Self {
        if name.starts_with(channel_prefixes::PRIVATE_ENCRYPTED) {
            Self::PrivateEncrypted
        } else if name.starts_with(channel_prefixes::PRIVATE) {
            Self::Private
        } else if name.starts_with(channel_prefixes::PRESENCE) {
            Self::Presence
        } else {
            Self::Public
        }
    }

    pub fn requires_authorization(&self) -> bool {
        !matches!(self, Self::Public)
    }

    /// Whether client events (`client-*`) may be triggered on this kind
    pub fn allows_client_events(&self) -> bool {
        matches!(self, Self::Private | Self::Presence)
    }
}

/// Per-kind state; only presence channels carry a member tracker
#[derive(Debug)]
pub enum ChannelVariant {
    Public,
    Private,
    Presence(PresenceTracker),
    PrivateEncrypted,
}

impl ChannelVariant {
    pub fn for_kind(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Public => Self::Public,
            ChannelKind::Private => Self::Private,
            ChannelKind::Presence => Self::Presence(PresenceTracker::new()),
            ChannelKind::PrivateEncrypted => Self::PrivateEncrypted,
        }
    }

    pub fn presence(&self) -> Option<&PresenceTracker> {
        match self {
            Self::Presence(tracker) => Some(tracker),
            _ => None,
        }
    }

    pub fn presence_mut(&mut self) -> Option<&mut PresenceTracker> {
        match self {
            Self::Presence(tracker) => Some(tracker),
            _ => None,
        }
    }
}

/// Application callback invoked for matching events
pub type EventCallback = Arc<dyn Fn(&PusherEvent) + Send + Sync + 'static>;

/// Which events a binding receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    Named(String),
    /// Every event in the binding's scope
    Any,
}

impl EventFilter {
    pub fn matches(&self, event_name: &str) -> bool {
        match self {
            Self::Named(name) => name == event_name,
            Self::Any => true,
        }
    }
}

/// Where a binding was registered
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingScope {
    /// All channels plus connection-level events
    Global,
    Channel(String),
}

/// Identifies one registration, for [`unbind`](crate::PusherClient::unbind)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingHandle {
    pub scope: BindingScope,
    pub(crate) id: u64,
}

/// Event binding for channel or global listeners
pub struct EventBinding {
    pub id: u64,
    pub filter: EventFilter,
    pub callback: EventCallback,
}

impl std::fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBinding")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Callbacks of `bindings` matching `event_name`, in binding order
pub fn matching_callbacks(bindings: &[EventBinding], event_name: &str) -> Vec<EventCallback> {
    bindings
        .iter()
        .filter(|binding| binding.filter.matches(event_name))
        .map(|binding| Arc::clone(&binding.callback))
        .collect()
}

/// Invokes callbacks in order; a panicking handler is logged and does not stop the others
pub fn invoke_all(callbacks: &[EventCallback], event: &PusherEvent) {
    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            tracing::error!("Handler for event '{}' panicked", event.name());
        }
    }
}

/// Mutable state for a PusherChannel
#[derive(Debug)]
pub struct ChannelState {
    pub status: SubscriptionState,
    pub bindings: Vec<EventBinding>,
    pub variant: ChannelVariant,
}

impl ChannelState {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            status: SubscriptionState::Unsubscribed,
            bindings: Vec::new(),
            variant: ChannelVariant::for_kind(kind),
        }
    }
}
