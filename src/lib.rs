//! # Pusher Channels Rust
//!
//! An async Rust client for the Pusher Channels WebSocket protocol (version 7).
//!
//! The client keeps one connection to the broker, reconnecting with backoff when it drops,
//! and multiplexes any number of channels over it:
//! - public channels
//! - `private-` channels, authorized through an [`Authorizer`]
//! - `presence-` channels, which additionally track who is subscribed
//! - `private-encrypted-` channels, whose payloads are decrypted before delivery
//!
//! ## Example
//!
//! ```no_run
//! use pusher_channels_rs::{PusherClient, PusherClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PusherClient::new(PusherClientOptions {
//!         app_key: "your-app-key".to_string(),
//!         cluster: Some("eu".to_string()),
//!         ..Default::default()
//!     })?;
//!
//!     let channel = client.subscribe("orders").await?;
//!     channel
//!         .bind("order-created", |event| println!("{:?}", event.data()))
//!         .await;
//!
//!     client.connect().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod channel;
pub mod client;
pub mod encryption;
pub mod infrastructure;
pub mod messaging;
pub mod types;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use auth::{AuthorizationResponse, Authorizer};
pub use channel::{
    BindingHandle, BindingScope, ChannelKind, MemberSnapshot, PresenceMember, PusherChannel,
    SubscriptionState,
};
pub use client::{ConnectionState, PusherClient, PusherClientBuilder, PusherClientOptions};
pub use infrastructure::{BackoffPolicy, ExponentialBackoff, HttpAuthorizer, IntervalBackoff};
pub use messaging::{FieldValue, ProtocolEvent, PusherEvent};
pub use types::{DecryptionError, PusherError, Result};
pub use websocket::{Transport, TransportConnection, TransportEvent, WebSocketTransport};
