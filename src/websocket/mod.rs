// Transport seam and its WebSocket implementation
mod transport;

pub use transport::{
    OutboundFrame, Transport, TransportConnection, TransportEvent, WebSocketTransport,
};
