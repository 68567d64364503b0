//! Change subscriptions.
//!
//! Subscribing is routed like a read. Unsubscribing is broadcast: the broker
//! keeps no index of which provider issued an id, so every registered
//! provider is asked to drop it and "unknown subscription" answers are
//! ignored.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::provider::{ChangeCallback, SubscriptionId};
use crate::router::StorageRouter;

/// Forwards subscriptions to providers.
#[derive(Clone)]
pub struct SubscriptionBroker {
    router: Arc<StorageRouter>,
}

impl SubscriptionBroker {
    /// Create a broker over `router`
    pub fn new(router: Arc<StorageRouter>) -> Self {
        Self { router }
    }

    /// Subscribe to changes of `key` on its routed provider.
    ///
    /// The provider-issued id is returned unchanged.
    pub async fn subscribe(&self, key: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        let selected = self.router.select_read_provider(key).await?;
        let id = selected.provider.subscribe(key, callback).await?;
        debug!(key, provider = %selected.id, subscription = %id, "subscribed");
        Ok(id)
    }

    /// Drop a subscription on every registered provider.
    ///
    /// Returns how many providers acknowledged the id. Never fails: unknown
    /// ids are expected from providers that did not issue them, and other
    /// errors are logged.
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> usize {
        let mut acknowledged = 0;
        for registered in self.router.providers() {
            match registered.provider.unsubscribe(id).await {
                Ok(()) => acknowledged += 1,
                Err(StorageError::UnknownSubscription(_)) => {}
                Err(e) => {
                    warn!(provider = %registered.id, subscription = %id, error = %e, "unsubscribe failed");
                }
            }
        }
        if acknowledged == 0 {
            debug!(subscription = %id, "no provider knew subscription");
        }
        acknowledged
    }
}
