//! Append-only conflict audit log.
//!
//! One JSON line per conflicting field per cycle. The engine never reads
//! this file back; writes are best-effort and must not abort a cycle.

use crate::engine::report::SyncConflict;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

#[derive(Serialize)]
struct ConflictLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    conflict: &'a SyncConflict,
}

/// Handle on `conflicts.log` in the state directory.
pub struct ConflictLog {
    path: PathBuf,
}

impl ConflictLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one line per conflict, stamped with `at`.
    pub fn append(&self, at: DateTime<Utc>, conflicts: &[SyncConflict]) {
        if conflicts.is_empty() {
            return;
        }
        if let Err(e) = self.try_append(at, conflicts) {
            warn!(path = %self.path.display(), error = %e, "failed to append conflict log");
        }
    }

    fn try_append(&self, at: DateTime<Utc>, conflicts: &[SyncConflict]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for conflict in conflicts {
            let line = serde_json::to_string(&ConflictLine { at, conflict })
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fields::TaskField;
    use tempfile::tempdir;

    fn sample_conflict() -> SyncConflict {
        SyncConflict {
            canonical_id: "cid-1".to_string(),
            field: TaskField::Title,
            providers: vec!["google".to_string(), "microsoft".to_string()],
            winner: "microsoft".to_string(),
            overwritten: vec!["google".to_string()],
            value: serde_json::json!("Tb"),
        }
    }

    #[test]
    fn appends_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conflicts.log");
        let log = ConflictLog::new(&path);

        let at = Utc::now();
        log.append(at, &[sample_conflict()]);
        log.append(at, &[sample_conflict()]);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["canonicalId"], "cid-1");
        assert_eq!(record["field"], "title");
        assert_eq!(record["winner"], "microsoft");
        assert_eq!(record["overwritten"][0], "google");
        assert!(record.get("at").is_some());
    }

    #[test]
    fn empty_batch_creates_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conflicts.log");
        ConflictLog::new(&path).append(Utc::now(), &[]);
        assert!(!path.exists());
    }
}
