//! Canonical task shape shared by the engine and every provider.
//!
//! Providers translate their native records into [`CanonicalTask`] at the port
//! boundary; the engine never sees provider-specific field layouts. Optional
//! instants are kept as RFC 3339 strings so provider round-trip noise
//! (precision, timezone suffixes) survives untouched and equality can be
//! decided by the field policies in `engine::fields`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
///
/// `Completed` is an ordinary, propagated state; only `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Active,
    Completed,
    Deleted,
}

/// Task priority as exposed by providers that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

/// One checklist entry of a task. Order is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub text: String,
    #[serde(default)]
    pub checked: bool,
}

/// The merged logical view of a task.
///
/// `id` holds the provider-local id when a task crosses the provider port and
/// is empty on persisted canonical baselines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTask {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Due date; only the `YYYY-MM-DD` prefix is meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<String>,
    /// Due time of day as `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    /// Opaque recurrence rule (RRULE-style string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    /// Provider-side last-modified instant; drives last-write-wins.
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl CanonicalTask {
    /// Create a minimal task with the given title, stamped now.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            notes: None,
            due_at: None,
            due_time: None,
            status: TaskStatus::Active,
            reminder: None,
            recurrence: None,
            categories: Vec::new(),
            importance: Importance::Normal,
            steps: Vec::new(),
            start_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Copy of this task with the provider-local id stripped, suitable for
    /// storing as a canonical baseline.
    pub fn without_id(&self) -> Self {
        let mut task = self.clone();
        task.id.clear();
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_serialization_omits_id() {
        let mut task = CanonicalTask::new("Buy milk");
        task.id = "g-123".to_string();

        let json = serde_json::to_value(task.without_id()).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["title"], "Buy milk");
    }

    #[test]
    fn status_round_trips_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Completed).unwrap(),
            "\"completed\""
        );
        let status: TaskStatus = serde_json::from_str("\"deleted\"").unwrap();
        assert_eq!(status, TaskStatus::Deleted);
    }

    #[test]
    fn missing_optional_fields_default() {
        let task: CanonicalTask =
            serde_json::from_str(r#"{"title": "bare"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.importance, Importance::Normal);
        assert!(task.categories.is_empty());
        assert_eq!(task.updated_at, DateTime::<Utc>::UNIX_EPOCH);
    }
}
