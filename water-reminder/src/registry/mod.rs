//! Subscription registry.
//!
//! The `SubscriptionRegistry` is the single owner of scheduling state:
//! - Tracks subscriptions by ID
//! - Hands out point-in-time snapshots for a scheduler tick
//! - Records successful deliveries (forward-only)
//!
//! It is shared by `Arc` between the scheduler and the registration service.
//! All mutation happens under a short write lock, so removals during a tick
//! never disturb a traversal that is already running over a snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::Subscription;

/// In-memory set of active subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<String, Subscription>>,
}

impl SubscriptionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription and return its ID.
    ///
    /// An entry with the same ID is replaced.
    pub fn add(&self, subscription: Subscription) -> String {
        let id = subscription.id.clone();
        let total = {
            let mut entries = self.entries.write();
            entries.insert(id.clone(), subscription);
            entries.len()
        };
        info!(subscription_id = %id, total, "Subscription added");
        id
    }

    /// Remove a subscription. Returns `false` if it was not present.
    pub fn remove(&self, id: &str) -> bool {
        let (removed, total) = {
            let mut entries = self.entries.write();
            let removed = entries.remove(id).is_some();
            (removed, entries.len())
        };
        if removed {
            info!(subscription_id = %id, total, "Subscription removed");
        }
        removed
    }

    /// Get a copy of a subscription.
    pub fn get(&self, id: &str) -> Option<Subscription> {
        self.entries.read().get(id).cloned()
    }

    /// Check if a subscription exists.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Number of subscriptions.
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of all current subscriptions, in no particular order.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.read().values().cloned().collect()
    }

    /// Visit every subscription present at call time.
    ///
    /// The closure runs without the lock held, so it may freely add, remove
    /// or update entries (including the one being visited).
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Subscription),
    {
        for subscription in self.snapshot() {
            f(&subscription);
        }
    }

    /// Record a successful delivery at `at`.
    ///
    /// Returns `false` if the subscription no longer exists. A timestamp
    /// older than the stored one is ignored.
    pub fn mark_sent(&self, id: &str, at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };

        match entry.last_notification_sent {
            Some(previous) if previous > at => {
                debug!(
                    subscription_id = %id,
                    previous = %previous,
                    attempted = %at,
                    "Ignoring backwards last-sent update"
                );
            }
            _ => entry.last_notification_sent = Some(at),
        }
        true
    }
}
