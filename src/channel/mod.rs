// Module declarations
mod config;
mod core;
mod manager;
mod presence;
mod state;

// Public API exports
pub use config::SubscribeData;
pub use core::PusherChannel;
pub use manager::SubscriptionManager;
pub use presence::{MemberSnapshot, PresenceChange, PresenceMember, PresenceTracker};
pub use state::{
    BindingHandle, BindingScope, ChannelKind, EventCallback, EventFilter, SubscriptionState,
};
