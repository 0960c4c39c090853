use crate::types::{PusherMessage, Result, pusher_events};
use serde::{Deserialize, Serialize};

/// Data of a `pusher:subscribe` frame
/// Reference: https://pusher.com/docs/channels/library_auth_reference/pusher-websockets-protocol/
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscribeData {
    pub channel: String,
    /// `<key>:<signature>` from the authorizer; absent for public channels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Presence identity, JSON text passed through untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

impl SubscribeData {
    pub fn public(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            auth: None,
            channel_data: None,
        }
    }

    pub fn into_message(self) -> Result<PusherMessage> {
        Ok(PusherMessage::new(
            pusher_events::SUBSCRIBE,
            serde_json::to_value(self)?,
        ))
    }
}
