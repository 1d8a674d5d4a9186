//! Stream Client
//!
//! [`StreamClient`] is the consumer-facing handle. It is cheap to clone; all
//! clones talk to the same connection manager task.
//!
//! # Usage
//!
//! ```rust,no_run
//! use market_stream_client::{ClientConfig, EventTopic, StreamClient, StreamEvent};
//!
//! # async fn run() -> Result<(), market_stream_client::ClientError> {
//! let client = StreamClient::with_websocket(ClientConfig::new("wss://quotes.example.com/ws"));
//!
//! client.on(EventTopic::key_update("AAPL"), |event| {
//!     if let StreamEvent::KeyUpdate { record, .. } = event {
//!         println!("AAPL price: {:?}", record.get("price"));
//!     }
//! });
//!
//! client.subscribe_to_keys(["AAPL"])?;
//! client.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::codec::FrameCodec;
use super::compression::{Compressor, GzipCompressor, NoopCompressor};
use super::manager::{Command, ConnectionManager, Shared};
use super::websocket::WebSocketConnector;
use crate::application::ports::Connector;
use crate::domain::connection::ConnectionState;
use crate::domain::delta::DeltaRecord;
use crate::domain::events::{EventTopic, StreamEvent};
use crate::domain::subscription::Subscription;
use crate::infrastructure::broadcast::HandlerId;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics::MetricsSnapshot;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by [`StreamClient`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// A connection attempt is already running.
    #[error("connection attempt already in progress")]
    ConnectionInProgress,

    /// The transport could not be opened.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The connection attempt was abandoned before it opened.
    #[error("not connected")]
    NotConnected,

    /// The outbound queue is at capacity.
    #[error("outbound queue full (capacity {0})")]
    QueueFull(usize),

    /// The client has been destroyed.
    #[error("client destroyed")]
    Destroyed,
}

/// What [`StreamClient::send`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the open transport.
    Sent,
    /// Queued until the next connection.
    Queued,
}

// =============================================================================
// Client Handle
// =============================================================================

/// Handle to a streaming market-data connection.
#[derive(Debug, Clone)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl StreamClient {
    /// Create a client over `connector` and spawn its connection manager.
    ///
    /// The client starts `Disconnected`; call [`connect`](Self::connect).
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let compressor: Arc<dyn Compressor> = if config.compression.enabled {
            Arc::new(GzipCompressor::new(config.compression.threshold))
        } else {
            Arc::new(NoopCompressor)
        };
        let token = config
            .connection
            .credentials
            .as_ref()
            .map(|c| c.token().to_string());
        let codec = FrameCodec::new(compressor, token);

        let shared = Arc::new(Shared::default());
        let (commands, commands_rx) = mpsc::unbounded_channel();

        ConnectionManager::spawn(config, connector, codec, Arc::clone(&shared), commands_rx);

        Self { commands, shared }
    }

    /// Create a client that connects over WebSocket.
    #[must_use]
    pub fn with_websocket(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(WebSocketConnector::new()))
    }

    /// Open the connection.
    ///
    /// Returns immediately if already connected (or paused). Resolves once
    /// the transport opens or the attempt fails; a failed attempt still
    /// schedules background reconnection.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionInProgress`] if an attempt is running
    /// - [`ClientError::ConnectFailed`] if the transport could not be opened
    /// - [`ClientError::NotConnected`] if the attempt was cancelled by
    ///   `disconnect()` or going offline
    /// - [`ClientError::Destroyed`] after `destroy()`
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| ClientError::Destroyed)?
    }

    /// Close the connection on purpose. No reconnect follows.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.command(Command::Disconnect)
    }

    /// Track keys. Keys already tracked are ignored; new keys are sent to
    /// the server at once when connected, otherwise on the next connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn subscribe_to_keys<I, S>(&self, keys: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = collect_keys(keys);
        if keys.is_empty() {
            return self.ensure_alive();
        }
        self.command(Command::Subscribe { keys })
    }

    /// Stop tracking keys and drop their cached delta records.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn unsubscribe_from_keys<I, S>(&self, keys: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = collect_keys(keys);
        if keys.is_empty() {
            return self.ensure_alive();
        }
        self.command(Command::Unsubscribe { keys })
    }

    /// Ask the server to stop streaming while the consumer is not looking.
    /// Only has an effect while connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn pause(&self) -> Result<(), ClientError> {
        self.command(Command::Pause)
    }

    /// Undo [`pause`](Self::pause). Only has an effect while paused.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn resume(&self) -> Result<(), ClientError> {
        self.command(Command::Resume)
    }

    /// Report consumer visibility. Hidden pauses, visible resumes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn set_visible(&self, visible: bool) -> Result<(), ClientError> {
        self.command(Command::SetVisible(visible))
    }

    /// Report network availability. Offline closes the connection without
    /// reconnecting; online reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub fn set_online(&self, online: bool) -> Result<(), ClientError> {
        self.command(Command::SetOnline(online))
    }

    /// Send a payload, or queue it until the next connection.
    ///
    /// # Errors
    ///
    /// - [`ClientError::QueueFull`] if not connected and the queue is full
    /// - [`ClientError::Destroyed`] after `destroy()`
    pub async fn send(&self, payload: Value) -> Result<SendOutcome, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { payload, reply })?;
        rx.await.map_err(|_| ClientError::Destroyed)?
    }

    /// Register an event handler.
    ///
    /// Handlers run synchronously on the connection manager task and must
    /// not block.
    pub fn on<F>(&self, topic: EventTopic, handler: F) -> HandlerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.shared.dispatcher.on(topic, handler)
    }

    /// Remove an event handler. Returns `true` if it was registered.
    pub fn off(&self, topic: &EventTopic, id: HandlerId) -> bool {
        self.shared.dispatcher.off(topic, id)
    }

    /// Receive every event over a broadcast channel.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.shared.dispatcher.subscribe()
    }

    /// Tracked subscriptions, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub async fn subscriptions(&self) -> Result<Vec<Subscription>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Subscriptions { reply })?;
        rx.await.map_err(|_| ClientError::Destroyed)
    }

    /// Last merged record for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub async fn delta(&self, key: impl Into<String>) -> Result<Option<DeltaRecord>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Delta {
            key: key.into(),
            reply,
        })?;
        rx.await.map_err(|_| ClientError::Destroyed)
    }

    /// Drop every cached delta record.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] after `destroy()`.
    pub async fn clear_deltas(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::ClearDeltas { reply })?;
        rx.await.map_err(|_| ClientError::Destroyed)
    }

    /// Current metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.metrics.state()
    }

    /// Close the connection, cancel every timer, clear all state and stop
    /// the connection manager. Every later call fails with
    /// [`ClientError::Destroyed`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Destroyed`] if already destroyed.
    pub async fn destroy(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Destroy { reply })?;
        rx.await.map_err(|_| ClientError::Destroyed)
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.ensure_alive()?;
        self.commands
            .send(command)
            .map_err(|_| ClientError::Destroyed)
    }

    fn ensure_alive(&self) -> Result<(), ClientError> {
        if self.shared.is_destroyed() {
            Err(ClientError::Destroyed)
        } else {
            Ok(())
        }
    }
}

fn collect_keys<I, S>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter()
        .map(Into::into)
        .filter(|key: &String| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_keys_skips_empty() {
        assert_eq!(collect_keys(["AAPL", "", "MSFT"]), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn client_error_messages() {
        assert_eq!(
            ClientError::QueueFull(1000).to_string(),
            "outbound queue full (capacity 1000)"
        );
        assert_eq!(ClientError::Destroyed.to_string(), "client destroyed");
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let client = StreamClient::with_websocket(ClientConfig::new("ws://127.0.0.1:9/"));

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.metrics().messages_sent, 0);
    }

    #[tokio::test]
    async fn calls_after_destroy_fail() {
        let client = StreamClient::with_websocket(ClientConfig::new("ws://127.0.0.1:9/"));

        client.destroy().await.unwrap();

        assert_eq!(client.subscribe_to_keys(["AAPL"]), Err(ClientError::Destroyed));
        assert_eq!(client.destroy().await, Err(ClientError::Destroyed));
        assert_eq!(
            client.send(serde_json::json!({"a": 1})).await,
            Err(ClientError::Destroyed)
        );
    }
}
