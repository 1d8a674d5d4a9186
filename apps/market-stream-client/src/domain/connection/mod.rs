//! Connection State
//!
//! The single process-wide lifecycle state of the stream connection.
//! Only the connection manager task performs transitions; everything else
//! reads a copy.

use serde::Serialize;

/// Lifecycle state of the duplex connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport is open.
    #[default]
    Disconnected,
    /// A transport open is in flight.
    Connecting,
    /// Transport open and updates flowing.
    Connected,
    /// Transport open, server asked to hold updates.
    Paused,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Paused => "paused",
        }
    }

    /// Whether a transport is currently open (connected or paused).
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Connected | Self::Paused)
    }

    /// Compact encoding for lock-free storage.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Paused => 3,
        }
    }

    /// Decode from [`ConnectionState::as_u8`]. Unknown values map to `Disconnected`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Paused,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
