//! Backend selection.
//!
//! For every call the router maps the key to its namespace, builds the
//! candidate chain (primary, fallback, then every other enabled provider in
//! registration order), filters it through the effective policy and returns
//! the first candidate whose availability probe succeeds. Probes are not
//! cached: a recovering backend is picked up on the very next call.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::key::namespace_of;
use crate::policy::StoragePolicy;
use crate::provider::StorageProvider;
use crate::registry::NamespaceRegistry;

/// A provider registered under an id
#[derive(Clone)]
pub struct RegisteredProvider {
    /// Id used in configuration and policies
    pub id: String,
    /// The backend
    pub provider: Arc<dyn StorageProvider>,
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("id", &self.id)
            .field("backend_type", &self.provider.backend_type())
            .finish()
    }
}

/// Outcome of a routing decision
#[derive(Clone)]
pub struct SelectedProvider {
    /// Id of the chosen provider
    pub id: String,
    /// The chosen backend
    pub provider: Arc<dyn StorageProvider>,
    /// Namespace the key resolved to
    pub namespace: String,
    /// Effective policy (namespace default merged with the call's policy)
    pub policy: StoragePolicy,
}

impl std::fmt::Debug for SelectedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedProvider")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Routes keys to providers.
#[derive(Debug)]
pub struct StorageRouter {
    registry: NamespaceRegistry,
    providers: Vec<RegisteredProvider>,
    disabled: HashSet<String>,
}

impl StorageRouter {
    /// Create a router over `providers` (kept in the given order).
    ///
    /// Providers disabled in `config` stay registered (for unsubscribe and
    /// metrics) but are never selected.
    pub fn new(config: &StorageConfig, providers: Vec<RegisteredProvider>) -> Self {
        let disabled = providers
            .iter()
            .filter(|p| !config.is_provider_enabled(&p.id))
            .map(|p| p.id.clone())
            .collect();

        Self {
            registry: NamespaceRegistry::from_config(config),
            providers,
            disabled,
        }
    }

    /// The namespace table
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// All registered providers, in registration order
    pub fn providers(&self) -> &[RegisteredProvider] {
        &self.providers
    }

    /// Look up a provider by id
    pub fn provider(&self, id: &str) -> Option<&Arc<dyn StorageProvider>> {
        self.providers
            .iter()
            .find(|p| p.id == id)
            .map(|p| &p.provider)
    }

    /// Whether `id` is registered and enabled
    pub fn is_enabled(&self, id: &str) -> bool {
        !self.disabled.contains(id) && self.provider(id).is_some()
    }

    /// Ordered, de-duplicated candidate chain for a namespace
    pub fn candidates(&self, namespace: &str) -> Vec<&RegisteredProvider> {
        let entry = self.registry.resolve(namespace);

        let mut order: Vec<&str> = vec![entry.primary.as_str()];
        if let Some(fallback) = &entry.fallback {
            order.push(fallback.as_str());
        }
        order.extend(self.providers.iter().map(|p| p.id.as_str()));

        let mut seen = HashSet::new();
        order
            .into_iter()
            .filter(|id| seen.insert(*id))
            .filter(|id| !self.disabled.contains(*id))
            .filter_map(|id| self.providers.iter().find(|p| p.id == id))
            .collect()
    }

    /// Select the provider for a write of `key`.
    ///
    /// Fails with `PolicyConflict` when the effective policy filters out
    /// every candidate, and with `ProviderUnavailable` when no remaining
    /// candidate passes its availability probe.
    pub async fn select_provider(
        &self,
        key: &str,
        policy: Option<&StoragePolicy>,
    ) -> StorageResult<SelectedProvider> {
        let namespace = namespace_of(key);
        let entry = self.registry.resolve(namespace);
        let effective = StoragePolicy::merge(&entry.default_policy, policy);
        self.select_in_namespace(namespace, effective, true).await
    }

    /// Select the provider for a read of `key`. Write policies are not applied.
    pub async fn select_read_provider(&self, key: &str) -> StorageResult<SelectedProvider> {
        self.select_namespace_reader(namespace_of(key)).await
    }

    /// Select the read provider for a whole namespace
    pub async fn select_namespace_reader(&self, namespace: &str) -> StorageResult<SelectedProvider> {
        self.select_in_namespace(namespace, StoragePolicy::default(), false)
            .await
    }

    async fn select_in_namespace(
        &self,
        namespace: &str,
        policy: StoragePolicy,
        apply_policy: bool,
    ) -> StorageResult<SelectedProvider> {
        let all = self.candidates(namespace);
        let candidates: Vec<&RegisteredProvider> = if apply_policy {
            all.iter().copied().filter(|c| policy.permits(&c.id)).collect()
        } else {
            all.clone()
        };

        if candidates.is_empty() {
            if all.is_empty() {
                return Err(StorageError::unavailable(namespace));
            }
            return Err(StorageError::PolicyConflict {
                namespace: namespace.to_string(),
                reason: format!(
                    "candidates [{}] excluded by allowed={:?} forbidden={:?}",
                    all.iter().map(|c| c.id.as_str()).collect::<Vec<_>>().join(", "),
                    policy.allowed_backends,
                    policy.forbidden_backends
                ),
            });
        }

        for (position, candidate) in candidates.iter().enumerate() {
            if candidate.provider.is_available().await {
                if position > 0 {
                    warn!(
                        namespace,
                        provider = %candidate.id,
                        "preferred provider unavailable, using fallback"
                    );
                } else {
                    debug!(namespace, provider = %candidate.id, "provider selected");
                }
                return Ok(SelectedProvider {
                    id: candidate.id.clone(),
                    provider: candidate.provider.clone(),
                    namespace: namespace.to_string(),
                    policy,
                });
            }
            debug!(namespace, provider = %candidate.id, "provider unavailable");
        }

        error!(namespace, "no storage provider available");
        Err(StorageError::unavailable(namespace))
    }

    /// Read `key` from its routed provider, propagating failures
    pub async fn read(&self, key: &str) -> StorageResult<Option<Value>> {
        let selected = self.select_read_provider(key).await?;
        selected.provider.get(key).await
    }

    /// Write `key` through the routed provider.
    ///
    /// Failures are logged and returned.
    pub async fn write(
        &self,
        key: &str,
        value: Value,
        policy: Option<&StoragePolicy>,
    ) -> StorageResult<SelectedProvider> {
        let selected = self.select_provider(key, policy).await.map_err(|e| {
            error!(key, error = %e, "write routing failed");
            e
        })?;

        selected
            .provider
            .set(key, value, &selected.policy)
            .await
            .map_err(|e| {
                error!(key, provider = %selected.id, error = %e, "write failed");
                e
            })?;
        Ok(selected)
    }

    /// Delete `key` through the routed provider.
    ///
    /// Failures are logged and returned.
    pub async fn remove(&self, key: &str) -> StorageResult<SelectedProvider> {
        let selected = self.select_provider(key, None).await.map_err(|e| {
            error!(key, error = %e, "delete routing failed");
            e
        })?;

        selected.provider.delete(key).await.map_err(|e| {
            error!(key, provider = %selected.id, error = %e, "delete failed");
            e
        })?;
        Ok(selected)
    }
}
