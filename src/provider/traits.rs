//! Storage Provider Traits
//!
//! Defines the capability contract every backend implements, plus the
//! optional namespace capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::StorageResult;
use crate::policy::StoragePolicy;

/// Opaque subscription handle issued by a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Issue a fresh random id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A change to a subscribed key
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    /// Key that changed
    pub key: String,
    /// New value, or `None` when the key was removed
    pub value: Option<Value>,
}

/// Callback invoked on every change to a subscribed key
pub type ChangeCallback = Arc<dyn Fn(&StorageChange) + Send + Sync>;

/// Health and size report for a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Whether the backend answered its probe
    pub available: bool,
    /// Approximate bytes held, if the backend can tell
    pub approx_size: Option<u64>,
    /// Number of live keys, if the backend can tell
    pub key_count: Option<usize>,
}

/// Core trait for storage providers
///
/// All backends must implement this trait. A provider owns its own
/// connection/handle and shares no state with other providers.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the backend type name (e.g., "memory", "file", "documentdb")
    fn backend_type(&self) -> &'static str;

    /// Check if the backend is available/connected
    async fn is_available(&self) -> bool;

    /// Read a value. Missing and expired keys yield `Ok(None)`.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Write a value, honouring `policy.ttl_ms`
    async fn set(&self, key: &str, value: Value, policy: &StoragePolicy) -> StorageResult<()>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Remove every key held by this provider
    async fn clear(&self) -> StorageResult<()>;

    /// Register a callback for changes to `key`
    async fn subscribe(&self, key: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId>;

    /// Drop a subscription.
    ///
    /// Returns [`StorageError::UnknownSubscription`](crate::StorageError::UnknownSubscription)
    /// if this provider never issued `id`.
    async fn unsubscribe(&self, id: &SubscriptionId) -> StorageResult<()>;

    /// Report availability and size
    async fn storage_info(&self) -> StorageResult<StorageInfo>;

    /// Namespace capability, if the provider implements it
    fn as_namespaced(&self) -> Option<&dyn NamespacedProvider> {
        None
    }
}

/// Optional capability: whole-namespace operations
///
/// Namespace membership follows [`crate::key::namespace_of`].
#[async_trait]
pub trait NamespacedProvider: Send + Sync {
    /// All live entries of a namespace, ordered by key
    async fn get_namespace(&self, namespace: &str) -> StorageResult<BTreeMap<String, Value>>;

    /// Remove every key of a namespace, returning how many were removed
    async fn clear_namespace(&self, namespace: &str) -> StorageResult<usize>;

    /// Pre-load a namespace into the provider's working set.
    ///
    /// Returns the number of entries warmed.
    async fn hydrate_namespace(&self, namespace: &str) -> StorageResult<usize> {
        Ok(self.get_namespace(namespace).await?.len())
    }
}
