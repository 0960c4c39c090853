use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::types::Result;

/// Frame written to the socket
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    /// Begin a clean close handshake
    Close,
}

/// Notification from the socket
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// An open socket, as seen by the client
///
/// Dropping `outbound` or sending [`OutboundFrame::Close`] shuts the socket down; `inbound`
/// ends after a `Closed` or `Error` event.
pub struct TransportConnection {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens socket connections to the broker
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<TransportConnection>;
}

/// Default transport backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportConnection> {
        tracing::debug!("Opening WebSocket connection to: {}", url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut write_half, mut read_half) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let writer_events = inbound_tx.clone();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = write_half.send(Message::Text(text.into())).await {
                            tracing::error!("WebSocket write error: {}", e);
                            let _ = writer_events.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    OutboundFrame::Close => {
                        if let Err(e) = write_half.close().await {
                            tracing::debug!("WebSocket close failed: {}", e);
                        }
                        break;
                    }
                }
            }
            tracing::debug!("Writer task finished");
        });

        tokio::spawn(async move {
            while let Some(msg_result) = read_half.next().await {
                let event = match msg_result {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text.to_string()),
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = match frame {
                            Some(close_frame) => (
                                Some(u16::from(close_frame.code)),
                                close_frame.reason.to_string(),
                            ),
                            None => (None, String::new()),
                        };
                        let _ = inbound_tx.send(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Ok(Message::Ping(data)) => {
                        tracing::debug!("Received ping ({} bytes)", data.len());
                        continue;
                    }
                    Ok(Message::Pong(data)) => {
                        tracing::debug!("Received pong ({} bytes)", data.len());
                        continue;
                    }
                    Ok(Message::Binary(data)) => {
                        tracing::warn!("Received unexpected binary message ({} bytes)", data.len());
                        continue;
                    }
                    Ok(Message::Frame(_)) => continue,
                    Err(e) => {
                        tracing::error!("WebSocket read error: {}", e);
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed {
                code: None,
                reason: "stream ended".to_string(),
            });
        });

        Ok(TransportConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
