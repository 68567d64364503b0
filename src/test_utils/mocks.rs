//! Mock providers for testing routing, fallback and hydration

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::policy::StoragePolicy;
use crate::provider::{
    ChangeCallback, MemoryProvider, NamespacedProvider, StorageInfo, StorageProvider,
    SubscriptionId,
};

/// Memory-backed provider with switchable availability and fault injection.
///
/// Availability and faults can be flipped at any time through `&self`, so a
/// test can hold an `Arc<FlakyProvider>` next to the storage that uses it.
pub struct FlakyProvider {
    inner: MemoryProvider,
    available: AtomicBool,
    namespaced: bool,
    fail_reads: AtomicBool,
    fail_hydration: AtomicBool,
    failing_keys: Mutex<HashSet<String>>,
    hydration_delay: Mutex<Option<Duration>>,
    hydration_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl Default for FlakyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FlakyProvider {
    /// Available provider with no faults
    pub fn new() -> Self {
        Self {
            inner: MemoryProvider::new(),
            available: AtomicBool::new(true),
            namespaced: true,
            fail_reads: AtomicBool::new(false),
            fail_hydration: AtomicBool::new(false),
            failing_keys: Mutex::new(HashSet::new()),
            hydration_delay: Mutex::new(None),
            hydration_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
        }
    }

    /// Provider that does not expose the namespace capability
    pub fn without_namespaces() -> Self {
        Self {
            namespaced: false,
            ..Self::new()
        }
    }

    /// Make the availability probe succeed or fail
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every `get` fail
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every hydration fail
    pub fn set_fail_hydration(&self, fail: bool) {
        self.fail_hydration.store(fail, Ordering::SeqCst);
    }

    /// Make writes and deletes of `key` fail
    pub fn fail_on_key<S: Into<String>>(&self, key: S) {
        self.failing_keys.lock().unwrap().insert(key.into());
    }

    /// Delay every hydration by `delay`
    pub fn set_hydration_delay(&self, delay: Duration) {
        *self.hydration_delay.lock().unwrap() = Some(delay);
    }

    /// Number of hydrations started
    pub fn hydration_calls(&self) -> usize {
        self.hydration_calls.load(Ordering::SeqCst)
    }

    /// Number of unsubscribe calls received
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// The wrapped memory provider, bypassing fault injection
    pub fn inner(&self) -> &MemoryProvider {
        &self.inner
    }

    fn check_key(&self, key: &str) -> StorageResult<()> {
        if self.failing_keys.lock().unwrap().contains(key) {
            return Err(StorageError::backend("flaky", format!("injected failure for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for FlakyProvider {
    fn backend_type(&self) -> &'static str {
        "flaky"
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::backend("flaky", "injected read failure"));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value, policy: &StoragePolicy) -> StorageResult<()> {
        self.check_key(key)?;
        self.inner.set(key, value, policy).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check_key(key)?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.inner.clear().await
    }

    async fn subscribe(&self, key: &str, callback: ChangeCallback) -> StorageResult<SubscriptionId> {
        self.inner.subscribe(key, callback).await
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> StorageResult<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.unsubscribe(id).await
    }

    async fn storage_info(&self) -> StorageResult<StorageInfo> {
        let mut info = self.inner.storage_info().await?;
        info.available = self.available.load(Ordering::SeqCst);
        Ok(info)
    }

    fn as_namespaced(&self) -> Option<&dyn NamespacedProvider> {
        if self.namespaced {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl NamespacedProvider for FlakyProvider {
    async fn get_namespace(&self, namespace: &str) -> StorageResult<BTreeMap<String, Value>> {
        self.inner.get_namespace(namespace).await
    }

    async fn clear_namespace(&self, namespace: &str) -> StorageResult<usize> {
        self.inner.clear_namespace(namespace).await
    }

    async fn hydrate_namespace(&self, namespace: &str) -> StorageResult<usize> {
        self.hydration_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.hydration_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_hydration.load(Ordering::SeqCst) {
            return Err(StorageError::backend("flaky", "injected hydration failure"));
        }
        Ok(self.inner.get_namespace(namespace).await?.len())
    }
}
