//! Persistence, migration, and locking behavior driven through full cycles.

use std::sync::Arc;
use task_sync::config::SyncConfig;
use task_sync::engine::SyncEngine;
use task_sync::provider::TaskProvider;
use task_sync::testing::MockProvider;
use task_sync::{CanonicalTask, EngineError};
use tempfile::TempDir;

fn engine_for(dir: &TempDir, providers: Vec<Arc<MockProvider>>) -> SyncEngine {
    let config = SyncConfig {
        state_dir: dir.path().to_path_buf(),
        ..SyncConfig::default()
    };
    let providers: Vec<Arc<dyn TaskProvider>> = providers
        .into_iter()
        .map(|p| p as Arc<dyn TaskProvider>)
        .collect();
    SyncEngine::new(providers, config).unwrap()
}

#[tokio::test]
async fn cycle_persists_state_and_cleans_temp_file() {
    let dir = TempDir::new().unwrap();
    let a = Arc::new(MockProvider::new("google"));
    let b = Arc::new(MockProvider::new("microsoft"));
    a.insert(CanonicalTask::new("persisted"));

    let engine = engine_for(&dir, vec![a, b]);
    engine.run_cycle().await.unwrap();

    assert!(dir.path().join("state.json").exists());
    assert!(!dir.path().join("state.json.tmp").exists());
    assert!(!dir.path().join("lock").exists());

    let raw = std::fs::read_to_string(dir.path().join("state.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["version"], 1);
    assert!(doc["lastSyncAt"].is_string());
}

#[tokio::test]
async fn corrupt_state_aborts_the_cycle() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("state.json"), "{broken").unwrap();

    let a = Arc::new(MockProvider::new("google"));
    let b = Arc::new(MockProvider::new("microsoft"));
    let engine = engine_for(&dir, vec![a, b]);

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, EngineError::CorruptState { .. }));
    // The broken file survives for manual recovery, and the lock was released.
    assert_eq!(
        std::fs::read_to_string(dir.path().join("state.json")).unwrap(),
        "{broken"
    );
    assert!(!dir.path().join("lock").exists());
}

#[tokio::test]
async fn v0_state_document_is_migrated_on_first_save() {
    let dir = TempDir::new().unwrap();
    let v0 = serde_json::json!({
        "lastSyncAt": "2026-01-10T08:00:00Z",
        "mappings": [
            {
                "canonicalId": "legacy-1",
                "byProvider": {"google": "g1"},
                "canonical": {"title": "legacy task"}
            },
            {"canonicalId": "legacy-empty", "byProvider": {}}
        ],
        "tombstones": []
    });
    std::fs::write(
        dir.path().join("state.json"),
        serde_json::to_string_pretty(&v0).unwrap(),
    )
    .unwrap();

    let a = Arc::new(MockProvider::new("google"));
    let b = Arc::new(MockProvider::new("microsoft"));
    let mut g1 = CanonicalTask::new("legacy task");
    g1.id = "g1".to_string();
    a.insert(g1);

    let engine = engine_for(&dir, vec![a, b.clone()]);
    engine.run_cycle().await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join("state.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["version"], 1);
    // The empty mapping was dropped; the real one survived and fanned out.
    let mappings = doc["mappings"].as_array().unwrap();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0]["canonicalId"], "legacy-1");
    assert_eq!(b.task_count(), 1);
}

#[tokio::test]
async fn lock_held_by_live_peer_fails_the_cycle() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lock"),
        format!("{{\"pid\": {}, \"at\": \"2026-08-01T00:00:00Z\"}}\n", std::process::id()),
    )
    .unwrap();

    let a = Arc::new(MockProvider::new("google"));
    let b = Arc::new(MockProvider::new("microsoft"));
    let engine = engine_for(&dir, vec![a, b]);

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, EngineError::LockHeld { .. }));
}

#[tokio::test]
async fn stale_lock_is_recovered_and_cycle_runs() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lock"),
        "{\"pid\": 4194999, \"at\": \"2026-08-01T00:00:00Z\"}\n",
    )
    .unwrap();

    let a = Arc::new(MockProvider::new("google"));
    let b = Arc::new(MockProvider::new("microsoft"));
    let engine = engine_for(&dir, vec![a, b]);

    engine.run_cycle().await.unwrap();
    assert!(!dir.path().join("lock").exists());
}

#[tokio::test]
async fn backup_tracks_the_previous_generation() {
    let dir = TempDir::new().unwrap();
    let a = Arc::new(MockProvider::new("google"));
    let b = Arc::new(MockProvider::new("microsoft"));

    let engine = engine_for(&dir, vec![a.clone(), b]);
    engine.run_cycle().await.unwrap();
    let first = std::fs::read_to_string(dir.path().join("state.json")).unwrap();

    a.insert(CanonicalTask::new("second generation"));
    engine.run_cycle().await.unwrap();

    let backup = std::fs::read_to_string(dir.path().join("state.json.bak")).unwrap();
    assert_eq!(backup, first);
}
