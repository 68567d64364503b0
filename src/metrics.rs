//! Aggregate usage and health across providers.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::router::StorageRouter;

/// Health of one registered provider
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderHealth {
    /// Backend kind
    pub backend_type: String,
    /// Result of the availability probe
    pub available: bool,
    /// Whether configuration lets the router select it
    pub enabled: bool,
    /// Bytes used, when reported
    pub approx_size: Option<u64>,
    /// Keys held, when reported
    pub key_count: Option<usize>,
}

/// Usage of one namespace summed over available providers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamespaceUsage {
    /// Number of keys
    pub keys: usize,
    /// Serialized size of the values in bytes
    pub size: u64,
}

/// Snapshot of storage usage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageMetrics {
    /// Keys over all available providers
    pub total_keys: usize,
    /// Bytes over all available providers
    pub total_size: u64,
    /// Per provider id
    pub provider_health: BTreeMap<String, ProviderHealth>,
    /// Per configured namespace
    pub namespace_usage: BTreeMap<String, NamespaceUsage>,
}

/// Probe every registered provider and aggregate what they report.
///
/// Unavailable providers are listed as unhealthy and add nothing to the
/// totals. A provider whose info or namespace listing fails is kept in the
/// health table and otherwise skipped.
pub async fn collect(router: &StorageRouter) -> StorageMetrics {
    let namespaces = router.registry().namespaces();
    let mut metrics = StorageMetrics::default();

    for registered in router.providers() {
        let provider = &registered.provider;
        let mut health = ProviderHealth {
            backend_type: provider.backend_type().to_string(),
            enabled: router.is_enabled(&registered.id),
            ..Default::default()
        };

        if !provider.is_available().await {
            debug!(provider = %registered.id, "provider unavailable, excluded from metrics");
            metrics.provider_health.insert(registered.id.clone(), health);
            continue;
        }
        health.available = true;

        match provider.storage_info().await {
            Ok(info) => {
                metrics.total_size += info.approx_size.unwrap_or(0);
                metrics.total_keys += info.key_count.unwrap_or(0);
                health.approx_size = info.approx_size;
                health.key_count = info.key_count;
            }
            Err(e) => warn!(provider = %registered.id, error = %e, "storage info failed"),
        }

        if let Some(enumerable) = provider.as_namespaced() {
            for namespace in &namespaces {
                match enumerable.get_namespace(namespace).await {
                    Ok(entries) => {
                        let usage = metrics.namespace_usage.entry(namespace.clone()).or_default();
                        usage.keys += entries.len();
                        usage.size += entries.values().map(|v| v.to_string().len() as u64).sum::<u64>();
                    }
                    Err(e) => {
                        warn!(provider = %registered.id, namespace = %namespace, error = %e, "namespace listing failed")
                    }
                }
            }
        }

        metrics.provider_health.insert(registered.id.clone(), health);
    }

    for namespace in namespaces {
        metrics.namespace_usage.entry(namespace).or_default();
    }
    metrics
}
