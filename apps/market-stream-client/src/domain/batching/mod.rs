//! Message Batching Window
//!
//! Coalesces inbound records per key over a time/size window. The window
//! itself is pure bookkeeping; the connection manager owns the flush timer
//! and turns a [`BatchFlush`] into events.
//!
//! Within one window only the latest record per key is delivered as the
//! key's update, while the full ordered history for that key is kept
//! alongside it for consumers that need every tick.

use std::collections::HashMap;

use crate::domain::delta::DeltaRecord;

/// Default flush interval in milliseconds.
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 100;

/// Default number of records that forces an immediate flush.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// An inbound record tagged with its key and arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// Subscription key.
    pub key: String,
    /// Arrival order within the window, starting at zero.
    pub sequence: u64,
    /// Merged record as produced by the delta store.
    pub record: DeltaRecord,
}

/// Result of [`BatchWindow::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// First record of a new window; a flush timer should be armed.
    Opened,
    /// The window already had records and is below the size limit.
    Buffered,
    /// The size limit was reached; flush now.
    Full,
}

/// Records for one key inside a flushed window.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBatch {
    /// Subscription key.
    pub key: String,
    /// Most recent record for the key.
    pub latest: DeltaRecord,
    /// Every record for the key in arrival order, `latest` included.
    pub entries: Vec<BatchEntry>,
}

/// A drained window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchFlush {
    /// One entry per key, ordered by first appearance in the window.
    pub keys: Vec<KeyBatch>,
    /// Total number of records in the window.
    pub total: usize,
}

impl BatchFlush {
    /// Check if the window was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// The current batching window.
#[derive(Debug)]
pub struct BatchWindow {
    max_batch_size: usize,
    entries: Vec<BatchEntry>,
    next_sequence: u64,
}

impl BatchWindow {
    /// Create a window that reports [`PushOutcome::Full`] once it holds
    /// `max_batch_size` records. A size of zero is treated as one.
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            entries: Vec::new(),
            next_sequence: 0,
        }
    }

    /// Append a record to the window.
    pub fn push(&mut self, record: DeltaRecord) -> PushOutcome {
        let was_empty = self.entries.is_empty();

        self.entries.push(BatchEntry {
            key: record.key.clone(),
            sequence: self.next_sequence,
            record,
        });
        self.next_sequence += 1;

        if self.entries.len() >= self.max_batch_size {
            PushOutcome::Full
        } else if was_empty {
            PushOutcome::Opened
        } else {
            PushOutcome::Buffered
        }
    }

    /// Drain the window, grouping records by key.
    pub fn take(&mut self) -> BatchFlush {
        let entries = std::mem::take(&mut self.entries);
        self.next_sequence = 0;

        let total = entries.len();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut keys: Vec<KeyBatch> = Vec::new();

        for entry in entries {
            if let Some(&slot) = index.get(&entry.key) {
                let batch = &mut keys[slot];
                batch.latest = entry.record.clone();
                batch.entries.push(entry);
            } else {
                index.insert(entry.key.clone(), keys.len());
                keys.push(KeyBatch {
                    key: entry.key.clone(),
                    latest: entry.record.clone(),
                    entries: vec![entry],
                });
            }
        }

        BatchFlush { keys, total }
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard buffered records.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_sequence = 0;
    }
}

impl Default for BatchWindow {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}
