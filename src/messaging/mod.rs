// Messaging module - Event model and inbound routing
pub mod event;
pub mod pusher_event;
pub mod router;

pub use event::ProtocolEvent;
pub use pusher_event::{FieldValue, PusherEvent};
pub use router::{ControlFrame, MessageRouter};
