use super::{ProtocolEvent, PusherEvent};
use crate::channel::SubscriptionManager;
use crate::types::ConnectionData;
use std::sync::Arc;

/// Connection-level frames handed back to the connection manager
#[derive(Debug, Clone)]
pub enum ControlFrame {
    /// Handshake; `None` when the payload carried no usable socket id
    ConnectionEstablished(Option<ConnectionData>, PusherEvent),
    Ping(PusherEvent),
    Pong(PusherEvent),
    Error(PusherEvent),
}

/// Routes incoming frames to the subscription manager, intercepting control frames
pub struct MessageRouter {
    subscriptions: Arc<SubscriptionManager>,
}

impl MessageRouter {
    pub fn new(subscriptions: Arc<SubscriptionManager>) -> Self {
        Self { subscriptions }
    }

    /// Decodes a text frame; malformed frames are logged and dropped.
    pub fn decode(text: &str) -> Option<PusherEvent> {
        match PusherEvent::parse(text) {
            Ok(event) => {
                tracing::debug!(
                    "Parsed frame: event={}, channel={:?}",
                    event.name(),
                    event.channel()
                );
                Some(event)
            }
            Err(e) => {
                tracing::warn!("Dropping frame: {} - Raw: {}", e, text);
                None
            }
        }
    }

    /// Classifies a connection-level event, or gives the event back if it is not one
    pub fn classify(event: PusherEvent) -> Result<ControlFrame, PusherEvent> {
        match event.kind() {
            ProtocolEvent::ConnectionEstablished => {
                let data = event.data_as::<ConnectionData>();
                Ok(ControlFrame::ConnectionEstablished(data, event))
            }
            ProtocolEvent::Ping => Ok(ControlFrame::Ping(event)),
            ProtocolEvent::Pong => Ok(ControlFrame::Pong(event)),
            ProtocolEvent::Error => Ok(ControlFrame::Error(event)),
            _ => Err(event),
        }
    }

    /// Routes a frame: control frames are returned, everything else is dispatched to channels
    pub async fn route(&self, text: &str) -> Option<ControlFrame> {
        let event = Self::decode(text)?;
        match Self::classify(event) {
            Ok(control) => Some(control),
            Err(event) => {
                self.subscriptions.dispatch(event).await;
                None
            }
        }
    }

    /// Delivers a control event to global handlers only
    pub async fn notify_global(&self, event: &PusherEvent) {
        self.subscriptions.dispatch_global(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_drops_malformed() {
        assert!(MessageRouter::decode(r#"{"data":"{}"}"#).is_none());
        assert!(MessageRouter::decode("garbage").is_none());
        assert!(MessageRouter::decode(r#"{"event":"pusher:pong"}"#).is_some());
    }

    #[test]
    fn test_classify_connection_established() {
        let event = PusherEvent::parse(
            r#"{"event":"pusher:connection_established","data":"{\"socket_id\":\"123.456\",\"activity_timeout\":30}"}"#,
        )
        .unwrap();

        match MessageRouter::classify(event) {
            Ok(ControlFrame::ConnectionEstablished(Some(data), _)) => {
                assert_eq!(data.socket_id, "123.456");
                assert_eq!(data.activity_timeout, Some(30));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_classify_handshake_without_socket_id() {
        let event =
            PusherEvent::parse(r#"{"event":"pusher:connection_established","data":"{}"}"#).unwrap();
        assert!(matches!(
            MessageRouter::classify(event),
            Ok(ControlFrame::ConnectionEstablished(None, _))
        ));
    }

    #[test]
    fn test_classify_passes_channel_events_through() {
        let event = PusherEvent::parse(r#"{"event":"new-message","channel":"chat"}"#).unwrap();
        let event = MessageRouter::classify(event).unwrap_err();
        assert_eq!(event.name(), "new-message");

        let event = PusherEvent::parse(r#"{"event":"pusher:ping"}"#).unwrap();
        assert!(matches!(
            MessageRouter::classify(event),
            Ok(ControlFrame::Ping(_))
        ));
    }
}
