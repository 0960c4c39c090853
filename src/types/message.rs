use serde::{Deserialize, Serialize};

use crate::types::constants::pusher_events;

/// Outbound protocol frame.
///
/// Inbound frames are decoded into [`PusherEvent`](crate::PusherEvent) instead; this type
/// only models what the client writes to the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PusherMessage {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PusherMessage {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            channel: None,
            data,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn ping() -> Self {
        Self::new(pusher_events::PING, serde_json::json!({}))
    }

    pub fn pong() -> Self {
        Self::new(pusher_events::PONG, serde_json::json!({}))
    }

    pub fn unsubscribe(channel: &str) -> Self {
        Self::new(
            pusher_events::UNSUBSCRIBE,
            serde_json::json!({ "channel": channel }),
        )
    }

    pub fn to_text(&self) -> crate::types::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `pusher:connection_established` payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionData {
    pub socket_id: String,
    /// Seconds of inactivity after which the broker expects a ping
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// `pusher:error` payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorData {
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: String,
}
