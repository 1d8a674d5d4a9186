//! Delta State Store
//!
//! Keeps the last known full record per key so sparse wire updates can be
//! turned into complete records. Later fields override earlier ones
//! (field-level last-write-wins) and the store remembers which fields the
//! most recent update touched.
//!
//! Records are a warm cache: nothing expires on its own. Entries go away on
//! unsubscribe, an explicit clear, or when the client is destroyed.

use std::collections::{BTreeSet, HashMap, hash_map::Entry};

use serde::Serialize;

/// A JSON field map.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Merged state for a single key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRecord {
    /// Subscription key.
    pub key: String,
    /// Union of every field ever received for this key.
    pub fields: Fields,
    /// Fields carried by the most recent update.
    ///
    /// `None` for the first update of a key, which is stored verbatim.
    pub changed_fields: Option<BTreeSet<String>>,
}

impl DeltaRecord {
    /// Look up a field in the full record.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Check whether the last update changed `field`.
    ///
    /// The first update counts as changing every field it carried.
    #[must_use]
    pub fn changed(&self, field: &str) -> bool {
        self.changed_fields
            .as_ref()
            .map_or_else(|| self.fields.contains_key(field), |c| c.contains(field))
    }
}

/// Last-known full record per key.
#[derive(Debug, Default)]
pub struct DeltaStore {
    records: HashMap<String, DeltaRecord>,
}

impl DeltaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update into the record for `key` and return a copy of
    /// the result.
    pub fn merge_update(&mut self, key: &str, partial: Fields) -> DeltaRecord {
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.changed_fields = Some(partial.keys().cloned().collect());
                record.fields.extend(partial);
                record.clone()
            }
            Entry::Vacant(entry) => entry
                .insert(DeltaRecord {
                    key: key.to_string(),
                    fields: partial,
                    changed_fields: None,
                })
                .clone(),
        }
    }

    /// Copy of the current record for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<DeltaRecord> {
        self.records.get(key).cloned()
    }

    /// Drop the record for `key`.
    pub fn remove(&mut self, key: &str) -> Option<DeltaRecord> {
        self.records.remove(key)
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of keys with a record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
