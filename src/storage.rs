//! The unified storage facade.
//!
//! [`UnifiedStorage`] is what applications hold. It owns the router, the
//! hydration coordinator and the subscription broker for one set of
//! providers, and converts typed values to and from JSON at the boundary.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use unistore::config::{NamespaceConfig, StorageConfig};
//! use unistore::provider::MemoryProvider;
//! use unistore::storage::UnifiedStorageBuilder;
//!
//! # async fn demo() -> unistore::error::StorageResult<()> {
//! let config = StorageConfig::new("memory")
//!     .with_namespace("prefs", NamespaceConfig::new("memory"));
//! let storage = UnifiedStorageBuilder::new(config)
//!     .with_provider("memory", Arc::new(MemoryProvider::new()))
//!     .build()?;
//!
//! storage.set("prefs.theme", &"dark", None).await?;
//! let theme: Option<String> = storage.get("prefs.theme").await;
//! assert_eq!(theme.as_deref(), Some("dark"));
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::hydration::{HydrationCoordinator, HydrationState};
use crate::metrics::{self, StorageMetrics};
use crate::migration::{self, MigrationReport};
use crate::policy::StoragePolicy;
use crate::provider::{StorageChange, StorageProvider, SubscriptionId};
use crate::router::{RegisteredProvider, StorageRouter};
use crate::subscription::SubscriptionBroker;

/// Builds a [`UnifiedStorage`] from configuration and provider instances.
pub struct UnifiedStorageBuilder {
    config: StorageConfig,
    providers: Vec<RegisteredProvider>,
}

impl UnifiedStorageBuilder {
    /// Start from `config` with no providers
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
        }
    }

    /// Register a provider under `id`.
    ///
    /// Registration order is the order of the last-resort fallback chain.
    /// Registering an id twice replaces the earlier provider in place.
    pub fn with_provider<S: Into<String>>(mut self, id: S, provider: Arc<dyn StorageProvider>) -> Self {
        let id = id.into();
        match self.providers.iter_mut().find(|p| p.id == id) {
            Some(existing) => existing.provider = provider,
            None => self.providers.push(RegisteredProvider { id, provider }),
        }
        self
    }

    /// Validate the configuration and assemble the storage.
    ///
    /// Fails with `Configuration` when the configuration is malformed or
    /// routes a namespace to a provider id that was never registered.
    pub fn build(self) -> StorageResult<UnifiedStorage> {
        let mut problems = self.config.validate();

        let registered: HashSet<&str> = self.providers.iter().map(|p| p.id.as_str()).collect();
        let router = StorageRouter::new(&self.config, self.providers.clone());
        let mut unknown: Vec<String> = router
            .registry()
            .referenced_providers()
            .into_iter()
            .filter(|(_, id)| !registered.contains(id))
            .map(|(ns, id)| format!("Namespace '{}': provider '{}' is not registered", ns, id))
            .collect();
        unknown.sort();
        problems.extend(unknown);

        if !problems.is_empty() {
            return Err(StorageError::config(problems.join("; ")));
        }

        info!(
            providers = router.providers().len(),
            namespaces = router.registry().namespaces().len(),
            default_provider = %self.config.default_provider,
            "unified storage ready"
        );
        Ok(UnifiedStorage::from_router(Arc::new(router)))
    }
}

/// Namespaced key-value storage over pluggable providers.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct UnifiedStorage {
    router: Arc<StorageRouter>,
    hydration: HydrationCoordinator,
    subscriptions: SubscriptionBroker,
}

impl UnifiedStorage {
    /// Assemble a storage around an existing router
    pub fn from_router(router: Arc<StorageRouter>) -> Self {
        Self {
            hydration: HydrationCoordinator::new(router.clone()),
            subscriptions: SubscriptionBroker::new(router.clone()),
            router,
        }
    }

    /// The router used for every call
    pub fn router(&self) -> &StorageRouter {
        &self.router
    }

    /// Read `key`.
    ///
    /// Any failure (no provider, backend error, value of another shape) is
    /// logged and reported as `None`. Use [`try_get`](Self::try_get) to see
    /// the error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "read failed, returning no value");
                None
            }
        }
    }

    /// Read `key`, propagating failures
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.router.read(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Write `value` under `key`.
    ///
    /// `policy` is merged over the namespace's default policy.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        policy: Option<StoragePolicy>,
    ) -> StorageResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| StorageError::Serialization(format!("{}: {}", key, e)))?;
        let selected = self.router.write(key, value, policy.as_ref()).await?;
        debug!(key, provider = %selected.id, "value stored");
        Ok(())
    }

    /// Delete `key` from its routed provider
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.router.remove(key).await.map(|_| ())
    }

    /// Remove every key of `namespace` from each enabled, available provider
    /// that can enumerate namespaces. Returns the number of keys removed.
    pub async fn clear_namespace(&self, namespace: &str) -> StorageResult<usize> {
        let mut removed = 0;
        for registered in self.router.providers() {
            if !self.router.is_enabled(&registered.id) {
                continue;
            }
            let Some(enumerable) = registered.provider.as_namespaced() else {
                continue;
            };
            if !registered.provider.is_available().await {
                debug!(namespace, provider = %registered.id, "skipping unavailable provider");
                continue;
            }
            removed += enumerable.clear_namespace(namespace).await?;
        }
        info!(namespace, removed, "namespace cleared");
        Ok(removed)
    }

    /// Watch `key` for changes on its routed provider
    pub async fn subscribe<F>(&self, key: &str, callback: F) -> StorageResult<SubscriptionId>
    where
        F: Fn(&StorageChange) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(key, Arc::new(callback)).await
    }

    /// Drop a subscription wherever it lives. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        self.subscriptions.unsubscribe(id).await;
    }

    /// Hydrate one namespace, or every configured namespace when `None`
    pub async fn hydrate(&self, namespace: Option<&str>) -> StorageResult<()> {
        match namespace {
            Some(ns) => self.hydration.hydrate(ns).await,
            None => self.hydration.hydrate_all().await,
        }
    }

    /// Wait until `namespace` is hydrated, starting hydration if needed
    pub async fn wait_for_hydration(&self, namespace: &str) -> StorageResult<()> {
        self.hydration.wait_for_hydration(namespace).await
    }

    /// Hydration state of `namespace`
    pub fn hydration_state(&self, namespace: &str) -> HydrationState {
        self.hydration.state(namespace)
    }

    /// Mark `namespace` for re-hydration on next request
    pub fn invalidate_hydration(&self, namespace: &str) -> bool {
        self.hydration.invalidate(namespace)
    }

    /// Copy `namespace` from provider `from` to provider `to`
    pub async fn migrate_namespace(
        &self,
        namespace: &str,
        from: &str,
        to: &str,
    ) -> StorageResult<MigrationReport> {
        migration::migrate_namespace(&self.router, namespace, from, to).await
    }

    /// Usage and health across all registered providers
    pub async fn get_metrics(&self) -> StorageMetrics {
        metrics::collect(&self.router).await
    }
}
