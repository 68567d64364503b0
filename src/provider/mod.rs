//! Storage Provider Abstraction
//!
//! Trait-based contract implemented by every physical backend, plus the
//! bundled backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   UnifiedStorage    │
//! │  (router, hydrate)  │
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │   StorageProvider   │  <-- Trait (+ optional NamespacedProvider)
//! │      (async)        │
//! └──────────┬──────────┘
//!            │
//!     ┌──────┼───────────┐
//!     │      │           │
//! ┌───▼──┐ ┌─▼────┐ ┌────▼──────┐
//! │Memory│ │ File │ │ DocumentDB│
//! └──────┘ └──────┘ └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use unistore::provider::{FileProvider, StorageProvider};
//! use unistore::StoragePolicy;
//! use serde_json::json;
//!
//! async fn example() -> unistore::StorageResult<()> {
//!     let provider = FileProvider::new("/path/to/storage")?;
//!
//!     provider.set("prefs.theme", json!("dark"), &StoragePolicy::default()).await?;
//!     let value = provider.get("prefs.theme").await?;
//!
//!     Ok(())
//! }
//! ```

mod file;
mod memory;
mod subscribers;
mod traits;

pub use file::FileProvider;
pub use memory::MemoryProvider;
pub use subscribers::SubscriberSet;
pub use traits::*;

#[cfg(feature = "storage-documentdb")]
mod documentdb;

#[cfg(feature = "storage-documentdb")]
pub use documentdb::DocumentDbProvider;
