pub mod constants;
pub mod error;
pub mod message;

pub use constants::*;
pub use error::{DecryptionError, PusherError, Result};
pub use message::{ConnectionData, ErrorData, PusherMessage};
