//! In-process storage provider.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio::time::Instant;

use super::subscribers::SubscriberSet;
use super::traits::{
    ChangeCallback, NamespacedProvider, StorageInfo, StorageProvider, SubscriptionId,
};
use crate::error::StorageResult;
use crate::key::in_namespace;
use crate::policy::StoragePolicy;

/// Writes between sweeps of expired entries
const SWEEP_INTERVAL: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory map with per-entry expiry.
///
/// Always available; contents are lost when the provider is dropped.
/// Expired entries are dropped when read and swept every few writes.
#[derive(Default)]
pub struct MemoryProvider {
    entries: RwLock<HashMap<String, Entry>>,
    subscribers: SubscriberSet,
    writes: AtomicUsize,
}

impl MemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Whether no live entry is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    fn remove_where<F>(&self, mut pred: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let doomed: Vec<String> = entries.keys().filter(|k| pred(k)).cloned().collect();
        for key in &doomed {
            entries.remove(key);
        }
        doomed
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: recheck under the write lock, a writer may have refreshed it
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.get(key).map_or(false, |e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, policy: &StoragePolicy) -> StorageResult<()> {
        let now = Instant::now();
        let expires_at = policy.ttl().and_then(|ttl| now.checked_add(ttl));
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
                entries.retain(|_, e| e.is_live(now));
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        self.subscribers.notify(key, Some(&value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some();
        if removed {
            self.subscribers.notify(key, None);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let removed = self.remove_where(|_| true);
        self.subscribers.notify_removed(&removed);
        Ok(())
    }

    async fn subscribe(&self, key: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        Ok(self.subscribers.add(key, callback))
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> StorageResult<()> {
        self.subscribers.remove(id)
    }

    async fn storage_info(&self) -> StorageResult<StorageInfo> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut size = 0u64;
        let mut count = 0usize;
        for (key, entry) in entries.iter().filter(|(_, e)| e.is_live(now)) {
            size += key.len() as u64 + entry.value.to_string().len() as u64;
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
impl NamespacedProvider for MemoryProvider {
    async fn get_namespace(&self, namespace: &str) -> StorageResult<BTreeMap<String, Value>> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .iter()
            .filter(|(k, e)| in_namespace(k, namespace) && e.is_live(now))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect())
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<usize> {
        let removed = self.remove_where(|k| in_namespace(k, namespace));
        self.subscribers.notify_removed(&removed);
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StorageChange;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_basic_operations() {
        let provider = MemoryProvider::new();
        let policy = StoragePolicy::default();

        provider.set("user.name", json!("ada"), &policy).await.unwrap();
        assert_eq!(provider.get("user.name").await.unwrap(), Some(json!("ada")));
        assert_eq!(provider.len(), 1);

        provider.delete("user.name").await.unwrap();
        assert_eq!(provider.get("user.name").await.unwrap(), None);

        // Idempotent delete
        provider.delete("user.name").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_ttl_expiry() {
        let provider = MemoryProvider::new();
        let policy = StoragePolicy::new().with_ttl(Duration::from_secs(10));

        provider.set("cache.token", json!("abc"), &policy).await.unwrap();
        provider.set("cache.unread", json!("def"), &policy).await.unwrap();
        assert!(provider.get("cache.token").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(provider.get("cache.token").await.unwrap().is_none());
        assert_eq!(provider.len(), 0);
        assert_eq!(provider.purge_expired(), 1);
    }

    fn stored(provider: &MemoryProvider) -> usize {
        provider.entries.read().unwrap().len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_expired_entry_dropped_on_read() {
        let provider = MemoryProvider::new();
        let policy = StoragePolicy::new().with_ttl(Duration::from_secs(1));
        provider.set("session.a", json!(1), &policy).await.unwrap();
        provider.set("session.b", json!(2), &policy).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(provider.get("session.a").await.unwrap().is_none());
        assert_eq!(stored(&provider), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_writes_sweep_expired_entries() {
        let provider = MemoryProvider::new();
        let short = StoragePolicy::new().with_ttl(Duration::from_secs(1));
        for i in 0..SWEEP_INTERVAL / 2 {
            provider.set(&format!("session.{}", i), json!(i), &short).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(2)).await;
        let keep = StoragePolicy::default();
        for i in 0..SWEEP_INTERVAL / 2 {
            provider.set(&format!("user.{}", i), json!(i), &keep).await.unwrap();
        }

        // Never read, never purged by hand
        assert_eq!(stored(&provider), SWEEP_INTERVAL / 2);
    }

    #[tokio::test]
    async fn test_memory_huge_ttl_never_expires() {
        let provider = MemoryProvider::new();
        let policy = StoragePolicy::new().with_ttl(Duration::MAX);
        provider.set("cache.forever", json!(1), &policy).await.unwrap();
        assert_eq!(provider.get("cache.forever").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_memory_namespace_operations() {
        let provider = MemoryProvider::new();
        let policy = StoragePolicy::default();
        provider.set("user.a", json!(1), &policy).await.unwrap();
        provider.set("user.b", json!(2), &policy).await.unwrap();
        provider.set("users.c", json!(3), &policy).await.unwrap();
        provider.set("loose", json!(4), &policy).await.unwrap();

        let user = provider.get_namespace("user").await.unwrap();
        assert_eq!(user.keys().collect::<Vec<_>>(), vec!["user.a", "user.b"]);

        let default = provider.get_namespace("default").await.unwrap();
        assert_eq!(default.len(), 1);

        assert_eq!(provider.clear_namespace("user").await.unwrap(), 2);
        assert!(provider.get("user.a").await.unwrap().is_none());
        assert_eq!(provider.get("users.c").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_memory_subscriptions() {
        let provider = MemoryProvider::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let id = provider
            .subscribe(
                "prefs.theme",
                Arc::new(move |c: &StorageChange| sink.lock().unwrap().push(c.value.clone())),
            )
            .await
            .unwrap();

        let policy = StoragePolicy::default();
        provider.set("prefs.theme", json!("dark"), &policy).await.unwrap();
        provider.clear().await.unwrap();
        provider.unsubscribe(&id).await.unwrap();
        provider.set("prefs.theme", json!("light"), &policy).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!("dark")), None]);
        assert!(provider.unsubscribe(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_storage_info() {
        let provider = MemoryProvider::new();
        provider
            .set("a.b", json!("xy"), &StoragePolicy::default())
            .await
            .unwrap();

        let info = provider.storage_info().await.unwrap();
        assert!(info.available);
        assert_eq!(info.key_count, Some(1));
        // "a.b" + "\"xy\""
        assert_eq!(info.approx_size, Some(7));
    }
}
