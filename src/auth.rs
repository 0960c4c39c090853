use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Grant returned by an [`Authorizer`] for a private, presence or encrypted channel
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    /// Signature sent with the subscribe frame (`"<key>:<signature>"`)
    pub auth: String,
    /// Presence channels: JSON with `user_id` and optional `user_info`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
    /// Encrypted channels: base64 of the 32 byte channel key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

impl AuthorizationResponse {
    pub fn new(auth: impl Into<String>) -> Self {
        Self {
            auth: auth.into(),
            channel_data: None,
            shared_secret: None,
        }
    }

    pub fn with_channel_data(mut self, channel_data: impl Into<String>) -> Self {
        self.channel_data = Some(channel_data.into());
        self
    }

    pub fn with_shared_secret(mut self, shared_secret: impl Into<String>) -> Self {
        self.shared_secret = Some(shared_secret.into());
        self
    }
}

impl std::fmt::Debug for AuthorizationResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationResponse")
            .field("auth", &self.auth)
            .field("channel_data", &self.channel_data)
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Application-controlled service granting channel subscriptions.
///
/// Typically backed by an HTTP endpoint (see [`HttpAuthorizer`](crate::HttpAuthorizer)),
/// but any source of signatures works.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, channel: &str, socket_id: &str) -> Result<AuthorizationResponse>;
}
