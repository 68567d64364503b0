//! Environment variable overrides for the storage configuration.

use std::env;
use std::path::Path;
use tracing::{debug, warn};

use super::config::StorageConfig;

/// Variable overriding `default_provider`
pub const DEFAULT_PROVIDER_VAR: &str = "UNISTORE_DEFAULT_PROVIDER";

/// Loads environment variables from a .env file and the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentLoader {
    env_file: Option<String>,
}

impl EnvironmentLoader {
    /// Initialize the environment loader.
    ///
    /// # Arguments
    /// * `env_file` - Path to a .env file. Nothing is loaded when `None`.
    pub fn new(env_file: Option<&Path>) -> Self {
        // Only an explicit path is loaded; the working directory is not searched
        if let Some(path) = env_file {
            if path.exists() {
                if let Err(e) = dotenv::from_path(path) {
                    warn!(path = %path.display(), error = %e, "failed to load .env file");
                }
            }
        }

        Self {
            env_file: env_file.map(|p| p.to_string_lossy().to_string()),
        }
    }

    /// The .env file this loader was created with
    pub fn env_file(&self) -> Option<&str> {
        self.env_file.as_deref()
    }

    /// Default provider override, if set and non-empty
    pub fn default_provider(&self) -> Option<String> {
        env::var(DEFAULT_PROVIDER_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Apply environment overrides to `config`
    pub fn apply(&self, config: &mut StorageConfig) {
        if let Some(provider) = self.default_provider() {
            debug!(provider = %provider, "default provider overridden from environment");
            config.default_provider = provider;
        }
    }
}
