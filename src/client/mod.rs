// Module declarations
mod builder;
mod connection;
mod core;
pub(crate) mod state;

// Public API exports
pub use builder::{PusherClientBuilder, PusherClientOptions};
pub(crate) use connection::ConnectionManager;
pub use connection::ConnectionState;
pub use core::PusherClient;
