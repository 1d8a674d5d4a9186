//! Wire Message Types
//!
//! JSON records exchanged over the duplex connection, discriminated by a
//! `type` field.
//!
//! # Message Types
//!
//! ## Control, client to server
//! - `subscribe` / `unsubscribe`: `{type, keys}`
//! - `ping`: `{type, timestamp}` (milliseconds since the Unix epoch)
//! - `pause` / `resume`: `{type, keys}`
//!
//! When credentials are configured every control message also carries a
//! `token` field.
//!
//! ## Control, server to client
//! - `subscribed` / `unsubscribed`: `{type, keys}`
//! - `pong`: `{type, timestamp?}`
//!
//! ## Data, server to client
//! Anything else is a data update keyed by `key`, falling back to `symbol`.
//! The remaining fields form the update's field map; the routing fields
//! `key`, `symbol` and `type` are not record data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec::CodecError;
use crate::domain::delta::Fields;

// =============================================================================
// Client Messages
// =============================================================================

/// Control message sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Request updates for keys.
    Subscribe {
        /// Keys to subscribe.
        keys: Vec<String>,
    },
    /// Stop updates for keys.
    Unsubscribe {
        /// Keys to unsubscribe.
        keys: Vec<String>,
    },
    /// Liveness probe.
    Ping {
        /// Opaque payload echoed by the server.
        timestamp: i64,
    },
    /// Hold updates for keys.
    Pause {
        /// Keys to pause.
        keys: Vec<String>,
    },
    /// Release held updates for keys.
    Resume {
        /// Keys to resume.
        keys: Vec<String>,
    },
}

impl ClientMessage {
    /// Message type name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Ping { .. } => "ping",
            Self::Pause { .. } => "pause",
            Self::Resume { .. } => "resume",
        }
    }
}

/// A [`ClientMessage`] with optional per-message credentials.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    #[serde(flatten)]
    message: &'a ClientMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    /// Wrap a message, attaching `token` when present.
    #[must_use]
    pub const fn new(message: &'a ClientMessage, token: Option<&'a str>) -> Self {
        Self { message, token }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Subscription confirmation.
    Subscribed {
        /// Confirmed keys.
        keys: Vec<String>,
    },
    /// Unsubscription confirmation.
    Unsubscribed {
        /// Confirmed keys.
        keys: Vec<String>,
    },
    /// Heartbeat reply.
    Pong {
        /// Echoed ping payload, if any.
        timestamp: Option<i64>,
    },
    /// Data update.
    Data(DataUpdate),
}

/// Wire fields that route a data update rather than describe it.
pub const ROUTING_FIELDS: [&str; 3] = ["key", "symbol", "type"];

/// A (possibly partial) data record for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUpdate {
    /// Subscription key.
    pub key: String,
    /// Fields of the wire object, minus [`ROUTING_FIELDS`].
    pub fields: Fields,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ControlMessage {
    Subscribed {
        #[serde(default)]
        keys: Vec<String>,
    },
    Unsubscribed {
        #[serde(default)]
        keys: Vec<String>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

impl From<ControlMessage> for ServerMessage {
    fn from(message: ControlMessage) -> Self {
        match message {
            ControlMessage::Subscribed { keys } => Self::Subscribed { keys },
            ControlMessage::Unsubscribed { keys } => Self::Unsubscribed { keys },
            ControlMessage::Pong { timestamp } => Self::Pong { timestamp },
        }
    }
}

impl ServerMessage {
    /// Classify a decoded JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an object, a control message is
    /// malformed, or a data update has neither `key` nor `symbol`.
    pub fn from_value(value: Value) -> Result<Self, CodecError> {
        let Value::Object(mut fields) = value else {
            return Err(CodecError::NotAnObject);
        };

        let is_control = matches!(
            fields.get("type").and_then(Value::as_str),
            Some("subscribed" | "unsubscribed" | "pong")
        );
        if is_control {
            let control: ControlMessage = serde_json::from_value(Value::Object(fields))?;
            return Ok(control.into());
        }

        let key = ["key", "symbol"]
            .iter()
            .find_map(|name| fields.get(*name).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or(CodecError::MissingKey)?;

        for name in ROUTING_FIELDS {
            fields.remove(name);
        }

        Ok(Self::Data(DataUpdate { key, fields }))
    }
}
