//! Copying a namespace between providers.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::error::{StorageError, StorageResult};
use crate::router::StorageRouter;

/// Outcome of a namespace migration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Migrated namespace
    pub namespace: String,
    /// Source provider id
    pub from: String,
    /// Destination provider id
    pub to: String,
    /// Keys written to the destination
    pub copied: Vec<String>,
    /// Keys not copied, the failed key first
    pub remaining: Vec<String>,
    /// Key whose write stopped the run
    pub failed_key: Option<String>,
    /// Error of the failed write
    pub error: Option<String>,
    /// Wall time of the copy
    pub duration: Duration,
}

impl MigrationReport {
    /// Whether every key was copied
    pub fn success(&self) -> bool {
        self.failed_key.is_none() && self.remaining.is_empty()
    }
}

/// Copy every entry of `namespace` from provider `from` to provider `to`.
///
/// Keys are copied in sorted order and the source is left untouched. The first
/// failed write stops the run; the report then lists what was copied and what
/// remains. Validation problems (unknown or unavailable providers, a source
/// that cannot enumerate namespaces) are returned as errors before anything is
/// written.
pub async fn migrate_namespace(
    router: &StorageRouter,
    namespace: &str,
    from: &str,
    to: &str,
) -> StorageResult<MigrationReport> {
    let source = router
        .provider(from)
        .ok_or_else(|| StorageError::UnknownProvider(from.to_string()))?;
    let destination = router
        .provider(to)
        .ok_or_else(|| StorageError::UnknownProvider(to.to_string()))?;

    if !source.is_available().await || !destination.is_available().await {
        return Err(StorageError::unavailable(namespace));
    }

    let enumerable = source
        .as_namespaced()
        .ok_or_else(|| StorageError::unsupported(from, "namespace enumeration"))?;

    let start = Instant::now();
    let entries = enumerable.get_namespace(namespace).await?;
    let policy = router.registry().resolve(namespace).default_policy.clone();

    let mut report = MigrationReport {
        namespace: namespace.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        ..Default::default()
    };

    let mut pending = entries.into_iter();
    for (key, value) in pending.by_ref() {
        if let Err(e) = destination.set(&key, value, &policy).await {
            error!(namespace, key = %key, to, error = %e, "migration write failed");
            report.error = Some(e.to_string());
            report.remaining.push(key.clone());
            report.failed_key = Some(key);
            break;
        }
        report.copied.push(key);
    }
    report.remaining.extend(pending.map(|(key, _)| key));
    report.duration = start.elapsed();

    info!(
        namespace,
        from,
        to,
        copied = report.copied.len(),
        remaining = report.remaining.len(),
        "namespace migration finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::policy::StoragePolicy;
    use crate::provider::StorageProvider;
    use crate::router::RegisteredProvider;
    use crate::test_utils::FlakyProvider;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (StorageRouter, Arc<FlakyProvider>, Arc<FlakyProvider>) {
        let old = Arc::new(FlakyProvider::new());
        let new = Arc::new(FlakyProvider::new());
        let policy = StoragePolicy::default();
        for (key, value) in [("user.a", 1), ("user.b", 2), ("user.c", 3), ("other.x", 4)] {
            old.set(key, json!(value), &policy).await.unwrap();
        }

        let router = StorageRouter::new(
            &StorageConfig::new("old"),
            vec![
                RegisteredProvider { id: "old".into(), provider: old.clone() },
                RegisteredProvider { id: "new".into(), provider: new.clone() },
            ],
        );
        (router, old, new)
    }

    #[tokio::test]
    async fn test_migration_copies_namespace() {
        let (router, old, new) = setup().await;

        let report = migrate_namespace(&router, "user", "old", "new").await.unwrap();
        assert!(report.success());
        assert_eq!(report.copied, vec!["user.a", "user.b", "user.c"]);

        assert_eq!(new.get("user.b").await.unwrap(), Some(json!(2)));
        assert_eq!(new.get("other.x").await.unwrap(), None);
        // Source keeps its data
        assert_eq!(old.get("user.b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_migration_stops_at_first_failure() {
        let (router, _, new) = setup().await;
        new.fail_on_key("user.b");

        let report = migrate_namespace(&router, "user", "old", "new").await.unwrap();
        assert!(!report.success());
        assert_eq!(report.copied, vec!["user.a"]);
        assert_eq!(report.failed_key.as_deref(), Some("user.b"));
        assert_eq!(report.remaining, vec!["user.b", "user.c"]);
        assert!(report.error.unwrap().contains("injected"));
        assert_eq!(new.get("user.c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_migration_validation() {
        let (router, old, _) = setup().await;

        let err = migrate_namespace(&router, "user", "old", "ghost").await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownProvider(ref id) if id == "ghost"));

        old.set_available(false);
        let err = migrate_namespace(&router, "user", "old", "new").await.unwrap_err();
        assert!(matches!(err, StorageError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_migration_requires_enumerable_source() {
        let source = Arc::new(FlakyProvider::without_namespaces());
        let router = StorageRouter::new(
            &StorageConfig::new("src"),
            vec![
                RegisteredProvider { id: "src".into(), provider: source },
                RegisteredProvider { id: "dst".into(), provider: Arc::new(FlakyProvider::new()) },
            ],
        );

        let err = migrate_namespace(&router, "user", "src", "dst").await.unwrap_err();
        assert!(matches!(err, StorageError::Unsupported { ref provider, .. } if provider == "src"));
    }

    #[tokio::test]
    async fn test_empty_namespace_migrates_trivially() {
        let (router, ..) = setup().await;
        let report = migrate_namespace(&router, "nothing", "old", "new").await.unwrap();
        assert!(report.success());
        assert!(report.copied.is_empty());
    }
}
