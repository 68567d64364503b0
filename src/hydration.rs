//! Per-namespace single-flight hydration.
//!
//! Hydration warms a namespace's routed provider (for example loading every
//! key of the namespace into a local working set). Any number of concurrent
//! callers share one in-flight warm-up per namespace: the in-flight future is
//! stored in the state map under the mutex before anyone awaits it, so the
//! check-then-launch sequence cannot race on a multi-threaded runtime.
//!
//! Hydration is an optimisation. Its failure is recorded and reported to
//! hydrate/wait callers only; ordinary reads and writes never wait on it.

use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::error::{StorageError, StorageResult};
use crate::router::StorageRouter;

/// Hydration lifecycle of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationState {
    /// Never hydrated, or invalidated
    #[default]
    Uninitialized,
    /// A warm-up is in flight
    Pending,
    /// Last warm-up succeeded
    Complete,
    /// Last warm-up failed; the next request retries
    Error,
}

type HydrationFuture = Shared<BoxFuture<'static, Result<usize, String>>>;

#[derive(Default)]
struct Slot {
    state: HydrationState,
    in_flight: Option<HydrationFuture>,
    last_error: Option<String>,
}

type SlotMap = Arc<Mutex<HashMap<String, Slot>>>;

/// Coordinates hydration for every namespace of one router.
#[derive(Clone)]
pub struct HydrationCoordinator {
    router: Arc<StorageRouter>,
    slots: SlotMap,
}

impl HydrationCoordinator {
    /// Create a coordinator with every namespace uninitialized
    pub fn new(router: Arc<StorageRouter>) -> Self {
        Self {
            router,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Hydrate `namespace`, or join the hydration already in flight.
    ///
    /// Returns immediately once the namespace is complete. A namespace in the
    /// error state is retried.
    pub async fn wait_for_hydration(&self, namespace: &str) -> StorageResult<()> {
        let in_flight = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots.entry(namespace.to_string()).or_default();

            if slot.state == HydrationState::Complete {
                return Ok(());
            }

            let pending = slot
                .in_flight
                .clone()
                .filter(|_| slot.state == HydrationState::Pending);
            match pending {
                Some(existing) => {
                    debug!(namespace, "joining in-flight hydration");
                    existing
                }
                None => {
                    let launched = self.launch(namespace);
                    slot.state = HydrationState::Pending;
                    slot.in_flight = Some(launched.clone());
                    launched
                }
            }
        };

        in_flight
            .await
            .map(|_| ())
            .map_err(|message| StorageError::hydration(namespace, message))
    }

    /// Alias of [`wait_for_hydration`](Self::wait_for_hydration)
    pub async fn hydrate(&self, namespace: &str) -> StorageResult<()> {
        self.wait_for_hydration(namespace).await
    }

    /// Hydrate every configured namespace concurrently.
    ///
    /// All hydrations run to completion; the first failure (in namespace
    /// order) is returned.
    pub async fn hydrate_all(&self) -> StorageResult<()> {
        let namespaces = self.router.registry().namespaces();
        let results = join_all(namespaces.iter().map(|ns| self.wait_for_hydration(ns))).await;
        results.into_iter().collect::<StorageResult<Vec<()>>>().map(|_| ())
    }

    /// Current state of `namespace`
    pub fn state(&self, namespace: &str) -> HydrationState {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(namespace)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Message of the last failed hydration of `namespace`
    pub fn last_error(&self, namespace: &str) -> Option<String> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(namespace)
            .and_then(|s| s.last_error.clone())
    }

    /// Forget a finished hydration so the next request runs it again.
    ///
    /// Pending hydrations are left alone; returns whether the state changed.
    pub fn invalidate(&self, namespace: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match slots.get_mut(namespace) {
            Some(slot) if slot.state != HydrationState::Pending => {
                let changed = slot.state != HydrationState::Uninitialized;
                slot.state = HydrationState::Uninitialized;
                slot.last_error = None;
                changed
            }
            _ => false,
        }
    }

    fn launch(&self, namespace: &str) -> HydrationFuture {
        let router = self.router.clone();
        let slots = self.slots.clone();
        let namespace = namespace.to_string();

        async move {
            let result = run_hydration(&router, &namespace).await;

            let mut guard = slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = guard.entry(namespace.clone()).or_default();
            slot.in_flight = None;
            match &result {
                Ok(count) => {
                    info!(namespace = %namespace, entries = count, "namespace hydrated");
                    slot.state = HydrationState::Complete;
                    slot.last_error = None;
                }
                Err(message) => {
                    error!(namespace = %namespace, error = %message, "namespace hydration failed");
                    slot.state = HydrationState::Error;
                    slot.last_error = Some(message.clone());
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

async fn run_hydration(router: &StorageRouter, namespace: &str) -> Result<usize, String> {
    let selected = router
        .select_namespace_reader(namespace)
        .await
        .map_err(|e| e.to_string())?;

    match selected.provider.as_namespaced() {
        Some(provider) => provider
            .hydrate_namespace(namespace)
            .await
            .map_err(|e| e.to_string()),
        None => {
            debug!(namespace, provider = %selected.id, "provider has no namespace capability, nothing to warm");
            Ok(0)
        }
    }
}
