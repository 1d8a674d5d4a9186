//! Outbound Queue
//!
//! Bounded FIFO of caller payloads produced while the client is not
//! `Connected`. Payloads are stored unchanged and encoded when drained.

use std::collections::VecDeque;

use serde_json::Value;

/// Default maximum number of queued payloads.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Payload rejected because the queue is at capacity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("outbound queue full ({capacity} messages)")]
pub struct QueueFull {
    /// Queue capacity.
    pub capacity: usize,
}

/// Bounded FIFO outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    messages: VecDeque<Value>,
    capacity: usize,
}

impl OutboundQueue {
    /// Create an empty queue holding at most `capacity` payloads.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity,
        }
    }

    /// Append a payload.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] if the queue is at capacity. Queued payloads are
    /// never dropped to make room.
    pub fn push(&mut self, message: Value) -> Result<usize, QueueFull> {
        if self.messages.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }

        self.messages.push_back(message);
        Ok(self.messages.len())
    }

    /// Remove the oldest payload.
    pub fn pop(&mut self) -> Option<Value> {
        self.messages.pop_front()
    }

    /// Put a payload back at the head, e.g. when sending it failed.
    pub fn push_front(&mut self, message: Value) {
        self.messages.push_front(message);
    }

    /// Number of queued payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Maximum number of payloads.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every queued payload.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
