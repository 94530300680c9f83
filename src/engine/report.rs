//! Structured results emitted by each sync cycle.

use crate::config::SyncMode;
use crate::engine::fields::TaskField;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of a provider write executed (or planned, on dry-run) in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Recreate,
    Delete,
}

/// One provider write. No-ops are counted but not listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAction {
    pub kind: ActionKind,
    pub provider: String,
    pub canonical_id: String,
    /// Absent for dry-run creates, where no server id exists yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Which stage of a cycle an error was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorStage {
    ListChanges,
    ListAll,
    Write,
}

/// A recorded, non-fatal failure. The cycle continues past these.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorRecord {
    pub provider: String,
    pub stage: ErrorStage,
    pub message: String,
}

/// One field resolved by last-write-wins against multiple contenders.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub canonical_id: String,
    pub field: TaskField,
    /// All providers that changed the field since the baseline.
    pub providers: Vec<String>,
    pub winner: String,
    pub overwritten: Vec<String>,
    /// The winning value.
    pub value: serde_json::Value,
}

/// Per-kind action totals, including writes suppressed as no-ops.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ActionCounts {
    pub created: usize,
    pub updated: usize,
    pub recreated: usize,
    pub deleted: usize,
    pub noops: usize,
}

impl ActionCounts {
    pub fn bump(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Create => self.created += 1,
            ActionKind::Update => self.updated += 1,
            ActionKind::Recreate => self.recreated += 1,
            ActionKind::Delete => self.deleted += 1,
        }
    }
}

/// Everything one cycle did, for logging and the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Providers that participated (healthy this cycle).
    pub providers: Vec<String>,
    pub previous_sync_at: Option<DateTime<Utc>>,
    pub new_sync_at: DateTime<Utc>,
    pub dry_run: bool,
    pub counts: ActionCounts,
    pub actions: Vec<SyncAction>,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<SyncErrorRecord>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// One-line digest for logs.
    pub fn summary(&self) -> String {
        format!(
            "mode={} providers=[{}] +{} ~{} !{} -{} noop={} conflicts={} errors={} ({}ms)",
            self.mode.as_str(),
            self.providers.join(","),
            self.counts.created,
            self.counts.updated,
            self.counts.recreated,
            self.counts.deleted,
            self.counts.noops,
            self.conflicts.len(),
            self.errors.len(),
            self.duration_ms
        )
    }

    pub fn record_action(&mut self, action: SyncAction) {
        self.counts.bump(action.kind);
        self.actions.push(action);
    }

    pub fn record_error(&mut self, provider: &str, stage: ErrorStage, message: impl Into<String>) {
        self.errors.push(SyncErrorRecord {
            provider: provider.to_string(),
            stage,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_recorded_actions() {
        let mut report = SyncReport {
            mode: SyncMode::Bidirectional,
            providers: vec!["google".to_string()],
            previous_sync_at: None,
            new_sync_at: Utc::now(),
            dry_run: false,
            counts: ActionCounts::default(),
            actions: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
        };

        report.record_action(SyncAction {
            kind: ActionKind::Create,
            provider: "google".to_string(),
            canonical_id: "c1".to_string(),
            provider_task_id: Some("g1".to_string()),
            title: None,
        });
        report.record_action(SyncAction {
            kind: ActionKind::Delete,
            provider: "google".to_string(),
            canonical_id: "c2".to_string(),
            provider_task_id: Some("g2".to_string()),
            title: None,
        });

        assert_eq!(report.counts.created, 1);
        assert_eq!(report.counts.deleted, 1);
        assert_eq!(report.actions.len(), 2);
        assert!(report.summary().contains("+1"));
    }
}
