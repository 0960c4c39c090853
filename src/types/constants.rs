/// Connection-level protocol event strings
pub mod pusher_events {
    pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
    pub const ERROR: &str = "pusher:error";
    pub const PING: &str = "pusher:ping";
    pub const PONG: &str = "pusher:pong";
    pub const SUBSCRIBE: &str = "pusher:subscribe";
    pub const UNSUBSCRIBE: &str = "pusher:unsubscribe";
}

/// Broker events that are re-tagged before they reach application handlers
pub mod internal_events {
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
    pub const MEMBER_ADDED: &str = "pusher_internal:member_added";
    pub const MEMBER_REMOVED: &str = "pusher_internal:member_removed";
    pub const MEMBER_UPDATED: &str = "pusher_internal:member_updated";
}

/// Application-visible event strings, including locally generated notifications
pub mod channel_events {
    pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher:subscription_succeeded";
    pub const SUBSCRIPTION_ERROR: &str = "pusher:subscription_error";
    pub const MEMBER_ADDED: &str = "pusher:member_added";
    pub const MEMBER_REMOVED: &str = "pusher:member_removed";
    pub const MEMBER_UPDATED: &str = "pusher:member_updated";
    pub const DECRYPTION_ERROR: &str = "pusher:decryption_error";
    pub const CONNECTION_STATE_CHANGED: &str = "pusher:connection_state_changed";
}

/// Channel name prefixes (checked longest first)
pub mod channel_prefixes {
    pub const PRIVATE_ENCRYPTED: &str = "private-encrypted-";
    pub const PRIVATE: &str = "private-";
    pub const PRESENCE: &str = "presence-";
}

/// Prefix required for client-originated events
pub const CLIENT_EVENT_PREFIX: &str = "client-";

/// Prefix shared by every protocol-reserved event name
pub const RESERVED_EVENT_PREFIX: &str = "pusher";

/// Longest channel name the broker accepts
pub const MAX_CHANNEL_NAME_LENGTH: usize = 164;

/// Protocol version announced in the connection URL
pub const PROTOCOL_VERSION: u8 = 7;

/// Client name announced in the connection URL
pub const CLIENT_NAME: &str = "pusher-channels-rs";

/// Default cluster when neither host nor cluster is configured
pub const DEFAULT_CLUSTER: &str = "mt1";

/// Default handshake / close timeout (milliseconds)
pub const DEFAULT_TIMEOUT: u64 = 10000;

/// Default inactivity window before a ping is sent (milliseconds)
pub const DEFAULT_ACTIVITY_TIMEOUT: u64 = 120000;

/// Default time to wait for any frame after a ping (milliseconds)
pub const DEFAULT_PONG_TIMEOUT: u64 = 30000;

/// Default reconnect backoff bounds (milliseconds)
pub const DEFAULT_RECONNECT_BASE: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX: u64 = 30000;

/// Broker close codes: 4000-4099 never reconnect, 4200-4299 reconnect immediately
pub const CLOSE_CODE_NO_RECONNECT: std::ops::Range<u16> = 4000..4100;
pub const CLOSE_CODE_RECONNECT_IMMEDIATELY: std::ops::Range<u16> = 4200..4300;

/// WebSocket close codes
pub const WS_CLOSE_NORMAL: u16 = 1000;
