//! Engine configuration.
//!
//! A single explicit value handed to [`crate::engine::SyncEngine`] at
//! construction; polling mode reuses the same value on every cycle. No
//! process-wide globals.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which providers act as sources and which as write targets.
///
/// Provider order is significant: `providers[0]` is the privileged side in
/// the one-way modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Every healthy provider is both source and target.
    Bidirectional,
    /// Only `providers[0]` sources; the rest are write-only targets.
    AToBOnly,
    /// `providers[0]` is authoritative and is never written to.
    Mirror,
}

impl SyncMode {
    /// Whether the provider at `index` contributes changes this cycle.
    pub fn is_source(&self, index: usize) -> bool {
        match self {
            SyncMode::Bidirectional => true,
            SyncMode::AToBOnly | SyncMode::Mirror => index == 0,
        }
    }

    /// Whether the engine may write to the provider at `index`.
    pub fn is_target(&self, index: usize) -> bool {
        match self {
            SyncMode::Bidirectional => true,
            SyncMode::AToBOnly | SyncMode::Mirror => index != 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Bidirectional => "bidirectional",
            SyncMode::AToBOnly => "a-to-b-only",
            SyncMode::Mirror => "mirror",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration consumed by the engine core.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Directory holding `state.json`, `conflicts.log`, and the lock file.
    pub state_dir: PathBuf,
    pub mode: SyncMode,
    /// Days a tombstone suppresses recreation before it is pruned.
    pub tombstone_ttl_days: i64,
    /// Compute and report actions without writing to providers or disk.
    pub dry_run: bool,
    /// Minutes between cycles in polling mode.
    pub poll_interval_minutes: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".task-sync"),
            mode: SyncMode::Bidirectional,
            tombstone_ttl_days: 30,
            dry_run: false,
            poll_interval_minutes: None,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.tombstone_ttl_days <= 0 {
            return Err(EngineError::config(format!(
                "tombstone TTL must be positive, got {}",
                self.tombstone_ttl_days
            )));
        }
        if let Some(minutes) = self.poll_interval_minutes {
            if minutes == 0 {
                return Err(EngineError::config("poll interval must be positive"));
            }
        }
        Ok(())
    }
}
