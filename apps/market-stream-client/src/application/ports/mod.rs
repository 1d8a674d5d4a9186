//! Port Interfaces
//!
//! Defines the transport contract the connection manager drives, following
//! the Hexagonal Architecture pattern. Infrastructure adapters implement it
//! for a real WebSocket; tests implement it over in-memory channels.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Connector`]: opens one duplex transport and hands back a [`TransportLink`]

use async_trait::async_trait;
use tokio::sync::mpsc;

// =============================================================================
// Frames
// =============================================================================

/// A single message on the duplex transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 JSON payload.
    Text(String),
    /// Compressed (or raw) JSON payload.
    Binary(Vec<u8>),
}

impl Frame {
    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Check if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something the transport reports to the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// An inbound frame.
    Frame(Frame),
    /// A transport error. A `Closed` always follows.
    Error(String),
    /// The transport closed.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Something the connection manager asks the transport to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write a frame.
    Send(Frame),
    /// Close with the given code. The transport stops after this.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Channel pair for one open transport.
///
/// Dropping `outbound` is treated by adapters as an abnormal close.
#[derive(Debug)]
pub struct TransportLink {
    /// Commands to the transport.
    pub outbound: mpsc::UnboundedSender<TransportCommand>,
    /// Events from the transport.
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Error opening a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL could not be used.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The transport failed to open.
    #[error("connection failed: {0}")]
    Connect(String),
}

// =============================================================================
// Connector Port
// =============================================================================

/// Opens duplex transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport cannot be opened.
    async fn connect(&self, url: &str) -> Result<TransportLink, TransportError>;
}

// =============================================================================
// Close Codes
// =============================================================================

/// WebSocket-style close codes used by the client.
pub mod close_codes {
    /// Intentional close via `disconnect()`.
    pub const NORMAL: u16 = 1000;
    /// Client shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// Transport died without a close frame.
    pub const ABNORMAL: u16 = 1006;
    /// Forced close after a missed pong.
    pub const HEARTBEAT_TIMEOUT: u16 = 4000;
    /// Close because the network went offline.
    pub const GOING_OFFLINE: u16 = 4001;
}
