//! Unistore - namespaced key/value storage over pluggable providers
//!
//! Unistore routes every key to a backend chosen per namespace, falls back
//! to other backends when the preferred one is unavailable, and coordinates
//! namespace warm-up so concurrent callers share a single hydration.
//!
//! - **`provider`** - The provider contract plus memory, file and (optional) DocumentDB backends
//! - **`config`** - TOML configuration and environment overrides
//! - **`router`** - Namespace → provider selection with policy filtering and fallback
//! - **`hydration`** - Single-flight namespace hydration
//! - **`storage`** - The [`UnifiedStorage`](storage::UnifiedStorage) facade
//!
//! # Features
//!
//! ```toml
//! [dependencies]
//! unistore = "0.1"
//! # With the MongoDB / DocumentDB provider:
//! unistore = { version = "0.1", features = ["storage-documentdb"] }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use unistore::prelude::*;
//!
//! # async fn demo() -> StorageResult<()> {
//! let config = StorageConfig::new("memory")
//!     .with_namespace("prefs", NamespaceConfig::new("local").with_fallback("memory"));
//!
//! let storage = UnifiedStorageBuilder::new(config)
//!     .with_provider("local", Arc::new(FileProvider::new("./data")?))
//!     .with_provider("memory", Arc::new(MemoryProvider::new()))
//!     .build()?;
//!
//! storage.set("prefs.theme", "dark", None).await?;
//! storage.wait_for_hydration("prefs").await?;
//! let theme: Option<String> = storage.get("prefs.theme").await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Storage configuration and environment overrides
pub mod config;

/// Error types
pub mod error;

/// Namespace hydration
pub mod hydration;

/// Key → namespace mapping
pub mod key;

/// Usage and health metrics
pub mod metrics;

/// Namespace migration between providers
pub mod migration;

/// Storage policies
pub mod policy;

/// Provider contract and built-in providers
pub mod provider;

/// Namespace routing table
pub mod registry;

/// Provider selection
pub mod router;

/// The unified storage facade
pub mod storage;

/// Change subscriptions
pub mod subscription;

/// Fault-injecting providers for tests
pub mod test_utils;

pub use error::{StorageError, StorageResult};
pub use policy::StoragePolicy;
pub use storage::{UnifiedStorage, UnifiedStorageBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{EnvironmentLoader, NamespaceConfig, StorageConfig};
    pub use crate::error::{StorageError, StorageResult};
    pub use crate::hydration::HydrationState;
    pub use crate::metrics::StorageMetrics;
    pub use crate::migration::MigrationReport;
    pub use crate::policy::StoragePolicy;
    pub use crate::provider::{
        FileProvider, MemoryProvider, NamespacedProvider, StorageChange, StorageProvider,
        SubscriptionId,
    };
    pub use crate::storage::{UnifiedStorage, UnifiedStorageBuilder};

    #[cfg(feature = "storage-documentdb")]
    pub use crate::provider::DocumentDbProvider;
}
