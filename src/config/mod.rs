//! Configuration management for the storage layer.
//!
//! Provider switches and the namespace routing table are loaded from TOML;
//! a few settings can be overridden from the environment.
//!
//! # Example
//!
//! ```no_run
//! use unistore::config::{EnvironmentLoader, StorageConfig};
//! use std::path::Path;
//!
//! let mut config = StorageConfig::from_file(Path::new("config/storage.toml")).unwrap();
//! EnvironmentLoader::new(None).apply(&mut config);
//!
//! println!("Default provider: {}", config.default_provider);
//! ```

#[allow(clippy::module_inception)]
pub mod config;
pub mod environment;

// Re-export main types for convenience
pub use self::config::{NamespaceConfig, ProviderConfig, StorageConfig};
pub use self::environment::{EnvironmentLoader, DEFAULT_PROVIDER_VAR};
