//! WebSocket Connector
//!
//! [`Connector`] over `tokio-tungstenite`. Each open transport is split into
//! a writer task draining [`TransportCommand`]s and a reader task producing
//! [`TransportEvent`]s. Protocol-level pings from the server are answered by
//! tungstenite itself.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{
    Connector, Frame, TransportCommand, TransportError, TransportEvent, TransportLink,
    close_codes,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError> {
        tracing::debug!(url, "Opening WebSocket");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| match e {
                WsError::Url(e) => TransportError::InvalidUrl(e.to_string()),
                WsError::HttpFormat(e) => TransportError::InvalidUrl(e.to_string()),
                other => TransportError::Connect(other.to_string()),
            })?;

        let (write, read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_writer(write, outbound_rx, inbound_tx.clone()));
        tokio::spawn(run_reader(read, inbound_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn run_writer(
    mut write: SplitSink<WsStream, Message>,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            TransportCommand::Send(frame) => {
                let message = match frame {
                    Frame::Text(text) => Message::Text(text.into()),
                    Frame::Binary(bytes) => Message::Binary(bytes.into()),
                };

                if let Err(e) = write.send(message).await {
                    tracing::warn!(error = %e, "WebSocket write failed");
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    return;
                }
            }
            TransportCommand::Close { code, reason } => {
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    tracing::debug!(error = %e, "WebSocket close failed");
                }
                let _ = write.close().await;
                return;
            }
        }
    }

    // Manager dropped the link
    let _ = write
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(close_codes::GOING_AWAY),
            reason: "client dropped".into(),
        })))
        .await;
}

async fn run_reader(
    mut read: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        let event = match read.next().await {
            Some(Ok(Message::Text(text))) => {
                TransportEvent::Frame(Frame::Text(text.as_str().to_owned()))
            }
            Some(Ok(Message::Binary(bytes))) => TransportEvent::Frame(Frame::Binary(bytes.to_vec())),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or_else(
                    || (close_codes::ABNORMAL, String::new()),
                    |f| (u16::from(f.code), f.reason.as_str().to_owned()),
                );
                tracing::info!(code, reason = %reason, "Server sent close frame");
                let _ = events.send(TransportEvent::Closed { code, reason });
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket read failed");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                let _ = events.send(TransportEvent::Closed {
                    code: close_codes::ABNORMAL,
                    reason: e.to_string(),
                });
                return;
            }
            None => {
                tracing::info!("WebSocket stream ended");
                let _ = events.send(TransportEvent::Closed {
                    code: close_codes::ABNORMAL,
                    reason: "stream ended".to_string(),
                });
                return;
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}
