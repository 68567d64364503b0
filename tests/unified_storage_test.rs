//! End-to-end tests for UnifiedStorage over real and fault-injecting providers

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use unistore::prelude::*;
use unistore::test_utils::FlakyProvider;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AgentRecord {
    name: String,
    tools: Vec<String>,
}

const CONFIG: &str = r#"
default_provider = "memory"

[providers.remote]
enabled = false

[namespaces.prefs]
provider = "local"
fallback = "memory"

[namespaces.agents]
provider = "local"

[namespaces.session]
provider = "memory"

[namespaces.session.default_policy]
ttl_ms = 500
forbidden_backends = ["local"]
"#;

fn build(dir: &TempDir) -> anyhow::Result<(UnifiedStorage, Arc<FileProvider>, Arc<MemoryProvider>)> {
    let config = StorageConfig::from_toml_str(CONFIG)?;
    let local = Arc::new(FileProvider::new(dir.path())?);
    let memory = Arc::new(MemoryProvider::new());

    let storage = UnifiedStorageBuilder::new(config)
        .with_provider("local", local.clone())
        .with_provider("memory", memory.clone())
        .with_provider("remote", Arc::new(FlakyProvider::new()))
        .build()?;
    Ok((storage, local, memory))
}

#[tokio::test]
async fn test_values_persist_across_instances() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let record = AgentRecord {
        name: "planner".into(),
        tools: vec!["search".into(), "shell".into()],
    };

    {
        let (storage, ..) = build(&dir)?;
        storage.set("agents.planner", &record, None).await?;
    }

    let (storage, _, memory) = build(&dir)?;
    let loaded: Option<AgentRecord> = storage.get("agents.planner").await;
    assert_eq!(loaded, Some(record));
    assert!(memory.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_namespace_isolation() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, ..) = build(&dir)?;

    storage.set("prefs.color", "blue", None).await?;
    storage.set("agents.color", "red", None).await?;
    storage.set("color", "green", None).await?;

    assert_eq!(storage.clear_namespace("prefs").await?, 1);
    assert_eq!(storage.get::<String>("prefs.color").await, None);
    assert_eq!(storage.get::<String>("agents.color").await.as_deref(), Some("red"));
    assert_eq!(storage.get::<String>("color").await.as_deref(), Some("green"));
    Ok(())
}

#[tokio::test]
async fn test_session_policy_routes_and_expires() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, local, memory) = build(&dir)?;

    storage.set("session.token", "abc", None).await?;
    assert_eq!(memory.len(), 1);
    assert!(local.get("session.token").await?.is_none());

    tokio::time::pause();
    tokio::time::advance(Duration::from_millis(501)).await;
    assert_eq!(storage.get::<String>("session.token").await, None);
    Ok(())
}

#[tokio::test]
async fn test_disabled_provider_is_never_selected() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, ..) = build(&dir)?;

    let only_remote = StoragePolicy::new().allow(["remote"]);
    let err = storage.set("prefs.x", &1, Some(only_remote)).await.unwrap_err();
    assert!(matches!(err, StorageError::PolicyConflict { .. }));

    let metrics = storage.get_metrics().await;
    assert!(!metrics.provider_health["remote"].enabled);
    Ok(())
}

#[tokio::test]
async fn test_migrate_file_namespace_to_memory() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, local, memory) = build(&dir)?;

    for i in 0..3 {
        storage.set(&format!("agents.a{}", i), &i, None).await?;
    }

    let report = storage.migrate_namespace("agents", "local", "memory").await?;
    assert!(report.success());
    assert_eq!(report.copied, vec!["agents.a0", "agents.a1", "agents.a2"]);
    assert_eq!(memory.get_namespace("agents").await?.len(), 3);
    assert_eq!(local.get_namespace("agents").await?.len(), 3);

    let metrics = storage.get_metrics().await;
    assert_eq!(metrics.namespace_usage["agents"].keys, 6);
    assert_eq!(metrics.total_keys, 6);
    Ok(())
}

#[tokio::test]
async fn test_fallback_when_primary_directory_disappears() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, _, memory) = build(&dir)?;
    std::fs::remove_dir_all(dir.path())?;

    storage.set("prefs.theme", "dark", None).await?;
    assert_eq!(memory.len(), 1);
    assert_eq!(storage.get::<String>("prefs.theme").await.as_deref(), Some("dark"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_hydration_is_single_flight() -> anyhow::Result<()> {
    let flaky = Arc::new(FlakyProvider::new());
    flaky.set_hydration_delay(Duration::from_millis(20));

    let config = StorageConfig::new("flaky").with_namespace("agents", NamespaceConfig::new("flaky"));
    let storage = UnifiedStorageBuilder::new(config)
        .with_provider("flaky", flaky.clone())
        .build()?;

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.wait_for_hydration("agents").await })
        })
        .collect();
    for waiter in waiters {
        waiter.await??;
    }

    assert_eq!(flaky.hydration_calls(), 1);
    assert_eq!(storage.hydration_state("agents"), HydrationState::Complete);
    Ok(())
}

#[tokio::test]
async fn test_environment_overrides_default_provider() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let env_file = dir.path().join(".env");
    std::fs::write(&env_file, "UNISTORE_DEFAULT_PROVIDER=local\n")?;

    let mut config = StorageConfig::from_toml_str(CONFIG)?;
    EnvironmentLoader::new(Some(env_file.as_path())).apply(&mut config);
    assert_eq!(config.default_provider, "local");
    Ok(())
}

#[tokio::test]
async fn test_round_trip_with_path_like_keys() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, local, memory) = build(&dir)?;

    let keys = [
        "agents.team/planner",
        "agents.team_planner",
        "agents.team\\planner",
        "agents.a..b",
        "agents.a_b",
        "agents.../../escape",
        ".agents",
    ];
    for (i, key) in keys.iter().enumerate() {
        storage.set(key, &i, None).await?;
    }

    for (i, key) in keys.iter().enumerate() {
        assert_eq!(storage.get::<usize>(key).await, Some(i), "key {}", key);
    }
    assert_eq!(local.get_namespace("agents").await?.len(), keys.len() - 1);

    let report = storage.migrate_namespace("agents", "local", "memory").await?;
    assert_eq!(report.copied.len(), keys.len() - 1);
    assert_eq!(memory.get_namespace("agents").await?.len(), keys.len() - 1);

    // Nothing escaped the provider directory
    for entry in std::fs::read_dir(dir.path())? {
        assert!(entry?.file_type()?.is_file());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_to_one_key() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let (storage, local, memory) = build(&dir)?;

    let writers: Vec<_> = (0..16)
        .map(|i| {
            let storage = storage.clone();
            tokio::spawn(async move { storage.set("prefs.theme", &format!("theme-{}", i), None).await })
        })
        .collect();
    for writer in writers {
        writer.await??;
    }

    let theme: Option<String> = storage.get("prefs.theme").await;
    assert!(theme.map_or(false, |t| t.starts_with("theme-")));
    assert_eq!(local.get_namespace("prefs").await?.len(), 1);
    assert!(memory.is_empty());
    Ok(())
}
