use crate::types::constants::{
    CLIENT_EVENT_PREFIX, channel_events, internal_events, pusher_events,
};

/// Type-safe classification of event names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProtocolEvent {
    /// Handshake carrying the socket id
    ConnectionEstablished,

    /// Broker-reported error
    Error,

    /// Keepalive request
    Ping,

    /// Keepalive reply
    Pong,

    /// Outbound subscription request
    Subscribe,

    /// Outbound unsubscription request
    Unsubscribe,

    /// Broker confirmed a subscription (internal or application-visible form)
    SubscriptionSucceeded,

    /// Local notification: authorization failed
    SubscriptionError,

    /// Presence member joined
    MemberAdded,

    /// Presence member left
    MemberRemoved,

    /// Presence member info changed
    MemberUpdated,

    /// Local notification: payload on an encrypted channel could not be decrypted
    DecryptionError,

    /// Local notification: connection state transition
    ConnectionStateChanged,

    /// Client-originated event (`client-*`)
    Client(String),

    /// Any other application event
    Custom(String),
}

impl ProtocolEvent {
    /// Classify an event name
    pub fn from_name(name: &str) -> Self {
        match name {
            pusher_events::CONNECTION_ESTABLISHED => Self::ConnectionEstablished,
            pusher_events::ERROR => Self::Error,
            pusher_events::PING => Self::Ping,
            pusher_events::PONG => Self::Pong,
            pusher_events::SUBSCRIBE => Self::Subscribe,
            pusher_events::UNSUBSCRIBE => Self::Unsubscribe,
            internal_events::SUBSCRIPTION_SUCCEEDED | channel_events::SUBSCRIPTION_SUCCEEDED => {
                Self::SubscriptionSucceeded
            }
            channel_events::SUBSCRIPTION_ERROR => Self::SubscriptionError,
            internal_events::MEMBER_ADDED | channel_events::MEMBER_ADDED => Self::MemberAdded,
            internal_events::MEMBER_REMOVED | channel_events::MEMBER_REMOVED => {
                Self::MemberRemoved
            }
            internal_events::MEMBER_UPDATED | channel_events::MEMBER_UPDATED => {
                Self::MemberUpdated
            }
            channel_events::DECRYPTION_ERROR => Self::DecryptionError,
            channel_events::CONNECTION_STATE_CHANGED => Self::ConnectionStateChanged,
            _ if name.starts_with(CLIENT_EVENT_PREFIX) => Self::Client(name.to_string()),
            _ => Self::Custom(name.to_string()),
        }
    }

    /// Application-visible name of the event
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConnectionEstablished => pusher_events::CONNECTION_ESTABLISHED,
            Self::Error => pusher_events::ERROR,
            Self::Ping => pusher_events::PING,
            Self::Pong => pusher_events::PONG,
            Self::Subscribe => pusher_events::SUBSCRIBE,
            Self::Unsubscribe => pusher_events::UNSUBSCRIBE,
            Self::SubscriptionSucceeded => channel_events::SUBSCRIPTION_SUCCEEDED,
            Self::SubscriptionError => channel_events::SUBSCRIPTION_ERROR,
            Self::MemberAdded => channel_events::MEMBER_ADDED,
            Self::MemberRemoved => channel_events::MEMBER_REMOVED,
            Self::MemberUpdated => channel_events::MEMBER_UPDATED,
            Self::DecryptionError => channel_events::DECRYPTION_ERROR,
            Self::ConnectionStateChanged => channel_events::CONNECTION_STATE_CHANGED,
            Self::Client(s) | Self::Custom(s) => s,
        }
    }

    /// Connection-level control events never reach channel-scoped handlers
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::ConnectionEstablished | Self::Error | Self::Ping | Self::Pong
        )
    }
}

impl From<&str> for ProtocolEvent {
    fn from(s: &str) -> Self {
        Self::from_name(s)
    }
}

impl std::fmt::Display for ProtocolEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
