//! Subscription Registry
//!
//! Reconciles the subscription keys the caller wants with what the server
//! has confirmed.
//!
//! # Design
//!
//! The registry tracks:
//! - One [`Subscription`] per key, `Pending` until the server acknowledges it
//! - Keys waiting to be sent in a `subscribe` frame
//! - Keys sent in an `unsubscribe` frame and not yet confirmed
//!
//! Server-side state is not assumed to survive a reconnect, so
//! [`SubscriptionRegistry::mark_all_pending`] demotes every tracked key back to
//! `Pending` and queues it for resubscription.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// Types
// =============================================================================

/// A subscription key (ticker symbol or feed id).
pub type Key = String;

/// Server confirmation status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Requested but not yet confirmed since the last connect.
    Pending,
    /// Confirmed by the server on the current connection.
    Active,
}

/// A tracked subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Subscription key.
    pub key: Key,
    /// Confirmation status.
    pub status: SubscriptionStatus,
    /// When the server confirmed it, if `Active`.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Subscription {
    fn pending(key: Key) -> Self {
        Self {
            key,
            status: SubscriptionStatus::Pending,
            confirmed_at: None,
        }
    }

    /// Check if the server has confirmed this subscription.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Active)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Desired vs. confirmed subscription bookkeeping.
///
/// Owned by the connection manager task; not shared.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use market_stream_client::domain::subscription::SubscriptionRegistry;
///
/// let mut registry = SubscriptionRegistry::new();
///
/// // Subscribing twice before confirmation tracks the key once
/// registry.add(&["AAPL".to_string()]);
/// registry.add(&["AAPL".to_string()]);
/// assert_eq!(registry.len(), 1);
///
/// // The pending set drains into one subscribe frame
/// assert_eq!(registry.take_pending_subscribe(), vec!["AAPL".to_string()]);
///
/// // Server confirmation makes it active
/// let confirmed = registry.confirm_subscribed(&["AAPL".to_string()], Utc::now());
/// assert_eq!(confirmed, vec!["AAPL".to_string()]);
/// assert_eq!(registry.active_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: HashMap<Key, Subscription>,
    pending_subscribe: BTreeSet<Key>,
    pending_unsubscribe: BTreeSet<Key>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track new keys as `Pending` and queue them for a subscribe frame.
    ///
    /// Returns the keys that were not tracked before.
    pub fn add(&mut self, keys: &[Key]) -> Vec<Key> {
        let mut added = Vec::new();

        for key in keys {
            if self.subscriptions.contains_key(key) {
                continue;
            }

            self.subscriptions
                .insert(key.clone(), Subscription::pending(key.clone()));
            self.pending_subscribe.insert(key.clone());
            self.pending_unsubscribe.remove(key);
            added.push(key.clone());
        }

        added
    }

    /// Stop tracking keys and queue them for an unsubscribe frame.
    ///
    /// Returns the keys that were tracked.
    pub fn remove(&mut self, keys: &[Key]) -> Vec<Key> {
        let mut removed = Vec::new();

        for key in keys {
            if self.subscriptions.remove(key).is_none() {
                continue;
            }

            self.pending_subscribe.remove(key);
            self.pending_unsubscribe.insert(key.clone());
            removed.push(key.clone());
        }

        removed
    }

    /// Drain the keys waiting for a subscribe frame.
    pub fn take_pending_subscribe(&mut self) -> Vec<Key> {
        std::mem::take(&mut self.pending_subscribe)
            .into_iter()
            .collect()
    }

    /// Keys sent for unsubscription that the server has not confirmed yet.
    #[must_use]
    pub fn pending_unsubscribe(&self) -> Vec<Key> {
        self.pending_unsubscribe.iter().cloned().collect()
    }

    /// Apply a `subscribed` confirmation.
    ///
    /// Returns the tracked keys that became `Active`. Keys no longer tracked
    /// (unsubscribed while the confirmation was in flight) are ignored.
    pub fn confirm_subscribed(&mut self, keys: &[Key], at: DateTime<Utc>) -> Vec<Key> {
        let mut confirmed = Vec::new();

        for key in keys {
            self.pending_subscribe.remove(key);

            if let Some(subscription) = self.subscriptions.get_mut(key) {
                subscription.status = SubscriptionStatus::Active;
                subscription.confirmed_at = Some(at);
                confirmed.push(key.clone());
            }
        }

        confirmed
    }

    /// Apply an `unsubscribed` confirmation.
    ///
    /// Returns the keys that were awaiting confirmation.
    pub fn confirm_unsubscribed(&mut self, keys: &[Key]) -> Vec<Key> {
        keys.iter()
            .filter(|key| self.pending_unsubscribe.remove(*key))
            .cloned()
            .collect()
    }

    /// Demote every tracked key to `Pending` and queue all of them for
    /// resubscription.
    ///
    /// Outstanding unsubscribes are dropped: a fresh server session holds no
    /// subscriptions to remove.
    pub fn mark_all_pending(&mut self) {
        for subscription in self.subscriptions.values_mut() {
            subscription.status = SubscriptionStatus::Pending;
            subscription.confirmed_at = None;
        }

        self.pending_subscribe = self.subscriptions.keys().cloned().collect();
        self.pending_unsubscribe.clear();
    }

    /// All tracked keys, sorted.
    #[must_use]
    pub fn tracked_keys(&self) -> Vec<Key> {
        let mut keys: Vec<_> = self.subscriptions.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Look up a tracked subscription.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Subscription> {
        self.subscriptions.get(key)
    }

    /// Copy of every tracked subscription, sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Subscription> {
        let mut subscriptions: Vec<_> = self.subscriptions.values().cloned().collect();
        subscriptions.sort_by(|a, b| a.key.cmp(&b.key));
        subscriptions
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of `Active` subscriptions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.subscriptions.values().filter(|s| s.is_active()).count()
    }

    /// Get statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            tracked: self.len(),
            active: self.active_count(),
            pending_subscribe: self.pending_subscribe.len(),
            pending_unsubscribe: self.pending_unsubscribe.len(),
        }
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.pending_subscribe.clear();
        self.pending_unsubscribe.clear();
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    /// Number of tracked keys.
    pub tracked: usize,
    /// Number of confirmed keys.
    pub active: usize,
    /// Keys waiting for a subscribe frame.
    pub pending_subscribe: usize,
    /// Keys awaiting unsubscribe confirmation.
    pub pending_unsubscribe: usize,
}

// =============================================================================
// Tests
// =============================================================================
