//! Namespace registry: namespace name → configured backends.

use std::collections::HashMap;

use crate::config::StorageConfig;
use crate::policy::StoragePolicy;

/// Resolved routing entry for a namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Primary provider id
    pub primary: String,
    /// Fallback provider id
    pub fallback: Option<String>,
    /// Default write policy
    pub default_policy: StoragePolicy,
}

/// Read-only namespace routing table.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    entries: HashMap<String, NamespaceEntry>,
    default_entry: NamespaceEntry,
}

impl NamespaceRegistry {
    /// Registry that routes every namespace to `default_provider`
    pub fn new<S: Into<String>>(default_provider: S) -> Self {
        Self {
            entries: HashMap::new(),
            default_entry: NamespaceEntry {
                primary: default_provider.into(),
                fallback: None,
                default_policy: StoragePolicy::default(),
            },
        }
    }

    /// Build the registry from configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        let mut registry = Self::new(config.default_provider.clone());
        for (name, ns) in &config.namespaces {
            registry.entries.insert(
                name.clone(),
                NamespaceEntry {
                    primary: ns.provider.clone(),
                    fallback: ns.fallback.clone(),
                    default_policy: ns.default_policy.clone(),
                },
            );
        }
        registry
    }

    /// Entry for `namespace`, or the default entry when unconfigured
    pub fn resolve(&self, namespace: &str) -> &NamespaceEntry {
        self.entries.get(namespace).unwrap_or(&self.default_entry)
    }

    /// Whether `namespace` has explicit configuration
    pub fn is_configured(&self, namespace: &str) -> bool {
        self.entries.contains_key(namespace)
    }

    /// Configured namespace names, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// The process-wide default entry
    pub fn default_entry(&self) -> &NamespaceEntry {
        &self.default_entry
    }

    /// Every provider id referenced by the table
    pub(crate) fn referenced_providers(&self) -> Vec<(&str, &str)> {
        let mut refs = vec![("<default>", self.default_entry.primary.as_str())];
        for (name, entry) in &self.entries {
            refs.push((name.as_str(), entry.primary.as_str()));
            if let Some(fallback) = &entry.fallback {
                refs.push((name.as_str(), fallback.as_str()));
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NamespaceConfig;

    #[test]
    fn test_resolve_configured_and_default() {
        let config = StorageConfig::new("memory")
            .with_namespace("prefs", NamespaceConfig::new("local").with_fallback("memory"));
        let registry = NamespaceRegistry::from_config(&config);

        let prefs = registry.resolve("prefs");
        assert_eq!(prefs.primary, "local");
        assert_eq!(prefs.fallback.as_deref(), Some("memory"));
        assert!(registry.is_configured("prefs"));

        let other = registry.resolve("unknown");
        assert_eq!(other.primary, "memory");
        assert!(other.fallback.is_none());
        assert!(!registry.is_configured("unknown"));
    }

    #[test]
    fn test_namespaces_sorted() {
        let config = StorageConfig::new("memory")
            .with_namespace("user", NamespaceConfig::new("memory"))
            .with_namespace("agents", NamespaceConfig::new("memory"));
        let registry = NamespaceRegistry::from_config(&config);
        assert_eq!(registry.namespaces(), vec!["agents", "user"]);
    }

    #[test]
    fn test_referenced_providers() {
        let config = StorageConfig::new("memory")
            .with_namespace("prefs", NamespaceConfig::new("local").with_fallback("remote"));
        let registry = NamespaceRegistry::from_config(&config);

        let ids: Vec<&str> = registry.referenced_providers().iter().map(|(_, id)| *id).collect();
        assert!(ids.contains(&"memory"));
        assert!(ids.contains(&"local"));
        assert!(ids.contains(&"remote"));
    }
}
