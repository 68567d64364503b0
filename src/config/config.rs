//! TOML configuration for providers and namespaces.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{StorageError, StorageResult};
use crate::policy::StoragePolicy;

/// Top-level storage configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Provider used for namespaces without explicit configuration
    #[serde(default = "default_provider_id")]
    pub default_provider: String,
    /// Per-provider switches, keyed by provider id
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Namespace routing table
    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceConfig>,
}

fn default_provider_id() -> String {
    "memory".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider_id(),
            providers: HashMap::new(),
            namespaces: HashMap::new(),
        }
    }
}

/// Per-provider configuration
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Disabled providers are never selected
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Routing entry for one namespace
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Primary provider id
    pub provider: String,
    /// Provider tried when the primary is unavailable
    #[serde(default)]
    pub fallback: Option<String>,
    /// Policy applied to every write in this namespace
    #[serde(default)]
    pub default_policy: StoragePolicy,
}

impl NamespaceConfig {
    /// Namespace routed to `provider` with no fallback
    pub fn new<S: Into<String>>(provider: S) -> Self {
        Self {
            provider: provider.into(),
            fallback: None,
            default_policy: StoragePolicy::default(),
        }
    }

    /// Set the fallback provider
    pub fn with_fallback<S: Into<String>>(mut self, fallback: S) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    /// Set the namespace default policy
    pub fn with_policy(mut self, policy: StoragePolicy) -> Self {
        self.default_policy = policy;
        self
    }
}

impl StorageConfig {
    /// Create a configuration routing everything to `default_provider`
    pub fn new<S: Into<String>>(default_provider: S) -> Self {
        Self {
            default_provider: default_provider.into(),
            ..Self::default()
        }
    }

    /// Add or replace a namespace entry
    pub fn with_namespace<S: Into<String>>(mut self, name: S, config: NamespaceConfig) -> Self {
        self.namespaces.insert(name.into(), config);
        self
    }

    /// Enable or disable a provider
    pub fn with_provider_enabled<S: Into<String>>(mut self, id: S, enabled: bool) -> Self {
        self.providers.insert(id.into(), ProviderConfig { enabled });
        self
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> StorageResult<Self> {
        toml::from_str(content)
            .map_err(|e| StorageError::config(format!("Failed to parse storage config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> StorageResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StorageError::config(format!(
                "Failed to read storage config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> StorageResult<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> StorageResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StorageError::config(format!("Failed to serialize storage config: {}", e)))
    }

    /// Whether `id` may be selected. Providers absent from `providers` are enabled.
    pub fn is_provider_enabled(&self, id: &str) -> bool {
        self.providers.get(id).map_or(true, |p| p.enabled)
    }

    /// Static validation; returns human-readable problems, empty if valid.
    ///
    /// Cross-checks against registered providers happen when the storage is
    /// built.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.default_provider.trim().is_empty() {
            errors.push("Default provider cannot be empty".to_string());
        }

        let mut names: Vec<&String> = self.namespaces.keys().collect();
        names.sort();
        for name in names {
            let ns = &self.namespaces[name];
            if name.is_empty() {
                errors.push("Namespace names cannot be empty".to_string());
            }
            if name.contains('.') {
                errors.push(format!("Namespace '{}': name cannot contain '.'", name));
            }
            if ns.provider.trim().is_empty() {
                errors.push(format!("Namespace '{}': provider cannot be empty", name));
            }
            if ns.fallback.as_deref() == Some(ns.provider.as_str()) {
                errors.push(format!(
                    "Namespace '{}': fallback cannot equal the primary provider",
                    name
                ));
            }
        }

        errors
    }
}
