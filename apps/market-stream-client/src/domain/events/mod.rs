//! Stream Events
//!
//! Lifecycle and data events published to consumers, and the topics handlers
//! register for. A topic's text form is the event name consumers know
//! (`connected`, `update`, `update:AAPL`, ...).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::batching::BatchEntry;
use crate::domain::delta::DeltaRecord;

// =============================================================================
// Events
// =============================================================================

/// An event published by the stream client.
///
/// Events are copies; nothing in them aliases the client's internal tables.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The transport opened.
    Connected {
        /// Log correlation id of the new connection.
        connection_id: String,
    },
    /// The transport closed.
    Disconnected {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// A transport or protocol error. Not fatal on its own.
    Error {
        /// Human readable description.
        message: String,
    },
    /// A reconnect has been scheduled.
    Reconnecting {
        /// One-based attempt number.
        attempt: u32,
        /// Delay before the attempt, jitter included.
        delay: Duration,
    },
    /// The reconnect budget is exhausted; the client stays disconnected.
    MaxReconnectAttemptsReached {
        /// Attempts made.
        attempts: u32,
    },
    /// The server confirmed subscriptions.
    Subscribed {
        /// Confirmed keys.
        keys: Vec<String>,
    },
    /// The server confirmed unsubscriptions.
    Unsubscribed {
        /// Confirmed keys.
        keys: Vec<String>,
    },
    /// Updates were paused.
    Paused {
        /// Keys covered by the pause.
        keys: Vec<String>,
    },
    /// Updates were resumed.
    Resumed {
        /// Keys covered by the resume.
        keys: Vec<String>,
    },
    /// Generic per-key update from a flushed batch window.
    Update {
        /// Subscription key.
        key: String,
        /// Latest merged record for the key.
        latest: DeltaRecord,
        /// Every record for the key in the window, in arrival order.
        window: Vec<BatchEntry>,
    },
    /// Latest record for one key, published on `update:<key>`.
    KeyUpdate {
        /// Subscription key.
        key: String,
        /// Latest merged record.
        record: DeltaRecord,
    },
    /// A batch window was flushed.
    BatchComplete {
        /// Total records in the window.
        count: usize,
    },
    /// The network went away; reconnects are suspended.
    Offline,
}

impl StreamEvent {
    /// Topic handlers must register for to receive this event.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Connected { .. } => EventTopic::Connected,
            Self::Disconnected { .. } => EventTopic::Disconnected,
            Self::Error { .. } => EventTopic::Error,
            Self::Reconnecting { .. } => EventTopic::Reconnecting,
            Self::MaxReconnectAttemptsReached { .. } => EventTopic::MaxReconnectAttemptsReached,
            Self::Subscribed { .. } => EventTopic::Subscribed,
            Self::Unsubscribed { .. } => EventTopic::Unsubscribed,
            Self::Paused { .. } => EventTopic::Paused,
            Self::Resumed { .. } => EventTopic::Resumed,
            Self::Update { .. } => EventTopic::Update,
            Self::KeyUpdate { key, .. } => EventTopic::KeyUpdate(key.clone()),
            Self::BatchComplete { .. } => EventTopic::BatchComplete,
            Self::Offline => EventTopic::Offline,
        }
    }
}

// =============================================================================
// Topics
// =============================================================================

/// Event topic a handler subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTopic {
    /// `connected`
    Connected,
    /// `disconnected`
    Disconnected,
    /// `error`
    Error,
    /// `reconnecting`
    Reconnecting,
    /// `maxReconnectAttemptsReached`
    MaxReconnectAttemptsReached,
    /// `subscribed`
    Subscribed,
    /// `unsubscribed`
    Unsubscribed,
    /// `paused`
    Paused,
    /// `resumed`
    Resumed,
    /// `update`
    Update,
    /// `update:<key>`
    KeyUpdate(String),
    /// `batchComplete`
    BatchComplete,
    /// `offline`
    Offline,
}

impl EventTopic {
    /// Topic for updates of a single key.
    #[must_use]
    pub fn key_update(key: impl Into<String>) -> Self {
        Self::KeyUpdate(key.into())
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Reconnecting => "reconnecting",
            Self::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Update => "update",
            Self::KeyUpdate(key) => return write!(f, "update:{key}"),
            Self::BatchComplete => "batchComplete",
            Self::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Error parsing an [`EventTopic`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for EventTopic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(key) = s.strip_prefix("update:") {
            if key.is_empty() {
                return Err(UnknownTopic(s.to_string()));
            }
            return Ok(Self::KeyUpdate(key.to_string()));
        }

        match s {
            "connected" => Ok(Self::Connected),
            "disconnected" => Ok(Self::Disconnected),
            "error" => Ok(Self::Error),
            "reconnecting" => Ok(Self::Reconnecting),
            "maxReconnectAttemptsReached" => Ok(Self::MaxReconnectAttemptsReached),
            "subscribed" => Ok(Self::Subscribed),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "paused" => Ok(Self::Paused),
            "resumed" => Ok(Self::Resumed),
            "update" => Ok(Self::Update),
            "batchComplete" => Ok(Self::BatchComplete),
            "offline" => Ok(Self::Offline),
            _ => Err(UnknownTopic(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("connected", EventTopic::Connected)]
    #[test_case("disconnected", EventTopic::Disconnected)]
    #[test_case("error", EventTopic::Error)]
    #[test_case("reconnecting", EventTopic::Reconnecting)]
    #[test_case("maxReconnectAttemptsReached", EventTopic::MaxReconnectAttemptsReached)]
    #[test_case("subscribed", EventTopic::Subscribed)]
    #[test_case("unsubscribed", EventTopic::Unsubscribed)]
    #[test_case("paused", EventTopic::Paused)]
    #[test_case("resumed", EventTopic::Resumed)]
    #[test_case("update", EventTopic::Update)]
    #[test_case("update:AAPL", EventTopic::key_update("AAPL"))]
    #[test_case("batchComplete", EventTopic::BatchComplete)]
    #[test_case("offline", EventTopic::Offline)]
    fn topic_names(name: &str, topic: EventTopic) {
        assert_eq!(name.parse::<EventTopic>().unwrap(), topic);
        assert_eq!(topic.to_string(), name);
    }

    #[test_case("update:" ; "empty key")]
    #[test_case("Connected" ; "wrong case")]
    #[test_case("" ; "empty")]
    fn rejects_unknown_topics(name: &str) {
        assert_eq!(
            name.parse::<EventTopic>(),
            Err(UnknownTopic(name.to_string()))
        );
    }

    #[test]
    fn key_update_event_topic_carries_key() {
        let event = StreamEvent::KeyUpdate {
            key: "MSFT".into(),
            record: DeltaRecord {
                key: "MSFT".into(),
                fields: serde_json::Map::new(),
                changed_fields: None,
            },
        };

        assert_eq!(event.topic(), EventTopic::key_update("MSFT"));
        assert_eq!(StreamEvent::Offline.topic(), EventTopic::Offline);
    }
}
