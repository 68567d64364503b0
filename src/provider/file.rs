//! File System Storage Provider
//!
//! Local persistent provider. Each key is stored as a JSON document in its
//! own file under the base path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::subscribers::SubscriberSet;
use super::traits::{
    ChangeCallback, NamespacedProvider, StorageInfo, StorageProvider, SubscriptionId,
};
use crate::error::StorageResult;
use crate::key::in_namespace;
use crate::policy::StoragePolicy;

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Reversible file-name encoding of a key.
///
/// ASCII alphanumerics, `-` and `_` pass through. A `.` passes through unless
/// it starts the name or follows another `.`, so no name is hidden, `.` or
/// `..`. Every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    let mut previous_dot = true;
    for byte in key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => {
                encoded.push(byte as char);
                previous_dot = false;
            }
            b'.' if !previous_dot => {
                encoded.push('.');
                previous_dot = true;
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
                previous_dot = false;
            }
        }
    }
    encoded
}

/// On-disk record. The original key is kept inside the file because the
/// file name is an encoded form of it.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct FileEntry {
    key: String,
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl FileEntry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Utc::now() < at)
    }
}

/// File system storage provider
///
/// Keys are translated to file paths relative to the base path.
pub struct FileProvider {
    base_path: PathBuf,
    subscribers: SubscriberSet,
}

impl FileProvider {
    /// Create a new file provider
    ///
    /// # Arguments
    /// * `base_path` - Base directory for all storage operations
    pub fn new<P: AsRef<Path>>(base_path: P) -> StorageResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        // Synchronous so the constructor stays non-async
        std::fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            subscribers: SubscriberSet::new(),
        })
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert a key to a full file path
    fn key_to_path(&self, key: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", encode_key(key), ENTRY_EXTENSION))
    }

    /// Per-write temp file next to `path`, never matching the entry extension
    fn temp_path(path: &Path) -> PathBuf {
        path.with_extension(format!(
            "{}.{}.{}",
            ENTRY_EXTENSION,
            uuid::Uuid::new_v4().simple(),
            TEMP_EXTENSION
        ))
    }

    async fn read_entry(&self, path: &Path) -> StorageResult<Option<FileEntry>> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: FileEntry = serde_json::from_slice(&data)?;
        Ok(Some(entry))
    }

    /// Every entry file under the base path, expired or not
    async fn scan(&self) -> StorageResult<Vec<(PathBuf, FileEntry)>> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_entry = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext == ENTRY_EXTENSION);
            if !is_entry || !entry.file_type().await?.is_file() {
                continue;
            }

            match self.read_entry(&path).await {
                Ok(Some(record)) => found.push((path, record)),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                }
            }
        }

        Ok(found)
    }

    async fn write_and_rename(temp_path: &Path, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(temp_path, path).await?;
        Ok(())
    }

    async fn remove_file(path: &Path) -> StorageResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageProvider for FileProvider {
    fn backend_type(&self) -> &'static str {
        "file"
    }

    async fn is_available(&self) -> bool {
        fs::metadata(&self.base_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let path = self.key_to_path(key);
        match self.read_entry(&path).await? {
            // A file written under another key's name is not ours
            Some(entry) if entry.key != key => Ok(None),
            Some(entry) if entry.is_live() => Ok(Some(entry.value)),
            Some(_) => {
                Self::remove_file(&path).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, policy: &StoragePolicy) -> StorageResult<()> {
        let path = self.key_to_path(key);
        let expires_at = policy
            .ttl()
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        let entry = FileEntry {
            key: key.to_string(),
            value,
            expires_at,
        };
        let data = serde_json::to_vec_pretty(&entry)?;

        // Write atomically using temp file + rename pattern
        let temp_path = Self::temp_path(&path);
        if let Err(e) = Self::write_and_rename(&temp_path, &path, &data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        self.subscribers.notify(key, Some(&entry.value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if Self::remove_file(&self.key_to_path(key)).await? {
            self.subscribers.notify(key, None);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        for (path, entry) in self.scan().await? {
            if Self::remove_file(&path).await? {
                self.subscribers.notify(&entry.key, None);
            }
        }
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

        let mut size = 0u64;
        let mut count = 0usize;
        for (path, entry) in self.scan().await? {
            if !entry.is_live() {
                continue;
            }
            size += fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
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
impl NamespacedProvider for FileProvider {
    async fn get_namespace(&self, namespace: &str) -> StorageResult<BTreeMap<String, Value>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .filter(|(_, e)| in_namespace(&e.key, namespace) && e.is_live())
            .map(|(_, e)| (e.key, e.value))
            .collect())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<usize> {
        let mut removed = 0;
        for (path, entry) in self.scan().await? {
            if !in_namespace(&entry.key, namespace) {
                continue;
            }
            if Self::remove_file(&path).await? {
                self.subscribers.notify(&entry.key, None);
                removed += 1;
            }
        }
        Ok(removed)
    }
}
