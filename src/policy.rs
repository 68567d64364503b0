//! Storage policies and the policy resolver.
//!
//! A policy gates writes: it narrows which backends may receive the value
//! and optionally gives the value a time-to-live. Namespaces carry a default
//! policy; callers may pass a per-call policy that overrides it field by
//! field.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-write directive.
///
/// Unset fields mean "no constraint". On merge a set field from the caller
/// replaces the namespace default wholesale (lists are not unioned).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StoragePolicy {
    /// Expiry in milliseconds after the write
    pub ttl_ms: Option<u64>,
    /// Whitelist of backend ids
    pub allowed_backends: Option<Vec<String>>,
    /// Blacklist of backend ids
    pub forbidden_backends: Option<Vec<String>>,
}

impl StoragePolicy {
    /// Policy with no constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Restrict writes to the given backends
    pub fn allow<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_backends = Some(backends.into_iter().map(Into::into).collect());
        self
    }

    /// Forbid writes to the given backends
    pub fn forbid<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_backends = Some(backends.into_iter().map(Into::into).collect());
        self
    }

    /// Time-to-live as a duration
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    /// Whether `backend` survives the allow/forbid lists
    pub fn permits(&self, backend: &str) -> bool {
        if let Some(forbidden) = &self.forbidden_backends {
            if forbidden.iter().any(|b| b == backend) {
                return false;
            }
        }
        match &self.allowed_backends {
            Some(allowed) if !allowed.is_empty() => allowed.iter().any(|b| b == backend),
            _ => true,
        }
    }

    /// Merge a namespace default with a per-call override; override wins.
    pub fn merge(default: &StoragePolicy, overrides: Option<&StoragePolicy>) -> StoragePolicy {
        let Some(overrides) = overrides else {
            return default.clone();
        };

        StoragePolicy {
            ttl_ms: overrides.ttl_ms.or(default.ttl_ms),
            allowed_backends: overrides
                .allowed_backends
                .clone()
                .or_else(|| default.allowed_backends.clone()),
            forbidden_backends: overrides
                .forbidden_backends
                .clone()
                .or_else(|| default.forbidden_backends.clone()),
        }
    }
}
