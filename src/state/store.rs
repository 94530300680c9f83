//! Crash-safe persistence for the sync state document.
//!
//! Writes go to a sibling temporary file followed by an atomic rename onto
//! `state.json`; the previous document is copied to `state.json.bak` first
//! (best-effort). A missing file loads as the empty default state; a
//! malformed file is a hard error and is never overwritten.

use super::SyncState;
use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const STATE_FILE: &str = "state.json";
const CONFLICT_LOG_FILE: &str = "conflicts.log";
const LOCK_FILE: &str = "lock";

/// Handle on the state directory.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    pub fn conflict_log_path(&self) -> PathBuf {
        self.dir.join(CONFLICT_LOG_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Load the persisted state, migrating v0 documents in memory.
    ///
    /// The migrated form reaches disk on the next [`StateStore::save`].
    pub async fn load(&self) -> EngineResult<SyncState> {
        let path = self.state_path();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting empty");
                return Ok(SyncState::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut state: SyncState =
            serde_json::from_str(&raw).map_err(|e| EngineError::CorruptState {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if state.migrate() {
            info!(path = %path.display(), "migrated state document to v1");
        }
        Ok(state)
    }

    /// Persist the state crash-atomically.
    pub async fn save(&self, state: &SyncState) -> EngineResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.state_path();
        let tmp_path = self.dir.join(format!("{STATE_FILE}.tmp"));
        let bak_path = self.dir.join(format!("{STATE_FILE}.bak"));

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp_path, content).await?;

        // Best-effort backup of the previous document; absence is not an error.
        match fs::copy(&path, &bak_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "failed to write state backup"),
        }

        fs::rename(&tmp_path, &path).await?;
        debug!(
            path = %path.display(),
            mappings = state.mappings.len(),
            tombstones = state.tombstones.len(),
            "state persisted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let state = store.load().await.unwrap();
        assert!(state.last_sync_at.is_none());
        assert!(state.mappings.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = SyncState::default();
        state.last_sync_at = Some(Utc::now());
        state.ensure_mapping("google", "g1");
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.mappings.len(), 1);
        assert!(loaded.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn save_keeps_backup_of_previous_document() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = SyncState::default();
        store.save(&state).await.unwrap();
        state.ensure_mapping("google", "g1");
        store.save(&state).await.unwrap();

        let bak = dir.path().join("state.json.bak");
        let previous: SyncState =
            serde_json::from_str(&std::fs::read_to_string(bak).unwrap()).unwrap();
        assert!(previous.mappings.is_empty());
    }

    #[tokio::test]
    async fn malformed_state_is_fatal_and_untouched() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        std::fs::write(store.state_path(), "{not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, EngineError::CorruptState { .. }));
        // File is left as-is for manual recovery.
        assert_eq!(
            std::fs::read_to_string(store.state_path()).unwrap(),
            "{not json"
        );
    }
}
