//! Per-key callback bookkeeping shared by the bundled providers.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use super::traits::{ChangeCallback, StorageChange, SubscriptionId};
use crate::error::{StorageError, StorageResult};

struct Subscriber {
    key: String,
    callback: ChangeCallback,
}

/// Subscriptions issued by one provider.
#[derive(Default)]
pub struct SubscriberSet {
    subscribers: RwLock<HashMap<SubscriptionId, Subscriber>>,
}

impl SubscriberSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `key` and issue its id
    pub fn add(&self, key: &str, callback: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId::generate();
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.insert(
            id.clone(),
            Subscriber {
                key: key.to_string(),
                callback,
            },
        );
        id
    }

    /// Remove a subscription issued by this set
    pub fn remove(&self, id: &SubscriptionId) -> StorageResult<()> {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::UnknownSubscription(id.to_string()))
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Whether no subscription is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every callback registered for `key`.
    ///
    /// Callbacks run after the lock is released so they may subscribe or
    /// unsubscribe themselves.
    pub fn notify(&self, key: &str, value: Option<&Value>) {
        let callbacks: Vec<ChangeCallback> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subscribers
                .values()
                .filter(|s| s.key == key)
                .map(|s| s.callback.clone())
                .collect()
        };
        if callbacks.is_empty() {
            return;
        }

        let change = StorageChange {
            key: key.to_string(),
            value: value.cloned(),
        };
        for callback in callbacks {
            callback(&change);
        }
    }

    /// Notify removal of each key in `keys`
    pub fn notify_removed<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for key in keys {
            self.notify(key, None);
        }
    }
}
