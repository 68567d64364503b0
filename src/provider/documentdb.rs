//! DocumentDB/MongoDB Storage Provider
//!
//! Durable remote provider backed by MongoDB or DocumentDB. Each key is one
//! document; the namespace segment is stored alongside so namespace scans
//! are a plain equality filter.
//!
//! ## Usage
//!
//! Enable the `storage-documentdb` feature in Cargo.toml:
//!
//! ```toml
//! unistore = { version = "0.1", features = ["storage-documentdb"] }
//! ```
//!
//! ```rust,no_run
//! use unistore::provider::DocumentDbProvider;
//!
//! async fn example() -> unistore::StorageResult<()> {
//!     let provider = DocumentDbProvider::new(
//!         "mongodb://localhost:27017",
//!         "app_db",
//!         "kv",
//!     ).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::ClientOptions,
    Client, Collection,
};
use serde_json::Value;
use std::collections::BTreeMap;

use super::subscribers::SubscriberSet;
use super::traits::{
    ChangeCallback, NamespacedProvider, StorageInfo, StorageProvider, SubscriptionId,
};
use crate::error::{StorageError, StorageResult};
use crate::key::namespace_of;
use crate::policy::StoragePolicy;

fn backend_err(e: mongodb::error::Error) -> StorageError {
    StorageError::backend("documentdb", e.to_string())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Expiry timestamp `ttl_ms` after `now`, clamped to `i64::MAX`
fn expiry_millis(now: i64, ttl_ms: u64) -> i64 {
    now.saturating_add(i64::try_from(ttl_ms).unwrap_or(i64::MAX))
}

/// DocumentDB/MongoDB storage provider
///
/// Change subscriptions cover writes made through this handle only.
pub struct DocumentDbProvider {
    client: Client,
    collection: Collection<Document>,
    database_name: String,
    subscribers: SubscriberSet,
}

impl DocumentDbProvider {
    /// Connect to a DocumentDB/MongoDB collection
    ///
    /// # Arguments
    /// * `connection_string` - MongoDB/DocumentDB connection string
    /// * `database` - Database name
    /// * `collection` - Collection name
    pub async fn new(
        connection_string: &str,
        database: &str,
        collection: &str,
    ) -> StorageResult<Self> {
        let client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let client = Client::with_options(client_options)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let coll = client.database(database).collection::<Document>(collection);

        Ok(Self {
            client,
            collection: coll,
            database_name: database.to_string(),
            subscribers: SubscriberSet::new(),
        })
    }

    /// Get the collection (for advanced operations)
    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }

    /// Filter matching documents that have not expired
    fn live_filter(mut filter: Document) -> Document {
        filter.insert(
            "$or",
            vec![
                doc! { "expires_at": mongodb::bson::Bson::Null },
                doc! { "expires_at": { "$gt": now_millis() } },
            ],
        );
        filter
    }

    fn decode(doc: &Document) -> StorageResult<(String, Value)> {
        let key = doc
            .get_str("_id")
            .map_err(|_| StorageError::Deserialization("Missing _id field".to_string()))?
            .to_string();
        let data = doc
            .get_str("data")
            .map_err(|_| StorageError::Deserialization("Invalid data format in document".to_string()))?;
        Ok((key, serde_json::from_str(data)?))
    }

    async fn find_keys(&self, filter: Document) -> StorageResult<Vec<String>> {
        let mut cursor = self.collection.find(filter).await.map_err(backend_err)?;
        let mut keys = Vec::new();
        while let Some(doc) = cursor.try_next().await.map_err(backend_err)? {
            if let Ok(key) = doc.get_str("_id") {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl StorageProvider for DocumentDbProvider {
    fn backend_type(&self) -> &'static str {
        "documentdb"
    }

    async fn is_available(&self) -> bool {
        self.client
            .database(&self.database_name)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let filter = Self::live_filter(doc! { "_id": key });
        match self.collection.find_one(filter).await.map_err(backend_err)? {
            Some(doc) => Ok(Some(Self::decode(&doc)?.1)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, policy: &StoragePolicy) -> StorageResult<()> {
        let data = serde_json::to_string(&value)?;
        let expires_at = policy.ttl_ms.map(|ttl| expiry_millis(now_millis(), ttl));

        let doc = doc! {
            "_id": key,
            "ns": namespace_of(key),
            "data": data.as_str(),
            "size": data.len() as i64,
            "modified_at": now_millis(),
            "expires_at": expires_at,
        };

        // Upsert the document
        self.collection
            .replace_one(doc! { "_id": key }, doc)
            .upsert(true)
            .await
            .map_err(backend_err)?;

        self.subscribers.notify(key, Some(&value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": key })
            .await
            .map_err(backend_err)?;

        if result.deleted_count > 0 {
            self.subscribers.notify(key, None);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let keys = if self.subscribers.is_empty() {
            Vec::new()
        } else {
            self.find_keys(doc! {}).await?
        };
        self.collection
            .delete_many(doc! {})
            .await
            .map_err(backend_err)?;
        self.subscribers.notify_removed(&keys);
        Ok(())
    }

    async fn subscribe(&self, key: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        Ok(self.subscribers.add(key, callback))
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> StorageResult<()> {
        self.subscribers.remove(id)
    }

    async fn storage_info(&self) -> StorageResult<StorageInfo> {
        if !self.is_available().await {
            return Ok(StorageInfo::default());
        }

        let mut cursor = self
            .collection
            .find(Self::live_filter(doc! {}))
            .await
            .map_err(backend_err)?;
        let mut size = 0u64;
        let mut count = 0usize;
        while let Some(doc) = cursor.try_next().await.map_err(backend_err)? {
            size += doc.get_i64("size").unwrap_or(0) as u64;
            count += 1;
        }

        Ok(StorageInfo {
            available: true,
            approx_size: Some(size),
            key_count: Some(count),
        })
    }

    fn as_namespaced(&self) -> Option<&dyn NamespacedProvider> {
        Some(self)
    }
}

#[async_trait]
impl NamespacedProvider for DocumentDbProvider {
    async fn get_namespace(&self, namespace: &str) -> StorageResult<BTreeMap<String, Value>> {
        let mut cursor = self
            .collection
            .find(Self::live_filter(doc! { "ns": namespace }))
            .await
            .map_err(backend_err)?;

        let mut entries = BTreeMap::new();
        while let Some(doc) = cursor.try_next().await.map_err(backend_err)? {
            let (key, value) = Self::decode(&doc)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<usize> {
        let keys = if self.subscribers.is_empty() {
            Vec::new()
        } else {
            self.find_keys(doc! { "ns": namespace }).await?
        };
        let result = self
            .collection
            .delete_many(doc! { "ns": namespace })
            .await
            .map_err(backend_err)?;
        self.subscribers.notify_removed(&keys);
        Ok(result.deleted_count as usize)
    }
}
