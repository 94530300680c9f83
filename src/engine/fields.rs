//! Field enumeration and semantic equality for canonical tasks.
//!
//! All cross-provider comparisons go through [`field_equal`] so the per-field
//! equivalence policies live in exactly one place: dates compare by
//! `YYYY-MM-DD` prefix, notes compare trimmed, optional strings collapse
//! `None` and `""` into one class, categories compare as a sorted set, steps
//! compare as an ordered sequence. This keeps provider round-trip noise
//! (precision, timezone suffixes, list reordering) from producing writes.

use crate::task::CanonicalTask;
use serde::Serialize;
use std::fmt;

/// The mergeable fields of a canonical task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskField {
    Title,
    Notes,
    DueAt,
    DueTime,
    Status,
    Reminder,
    Recurrence,
    Categories,
    Importance,
    Steps,
    StartAt,
}

impl TaskField {
    pub const ALL: [TaskField; 11] = [
        TaskField::Title,
        TaskField::Notes,
        TaskField::DueAt,
        TaskField::DueTime,
        TaskField::Status,
        TaskField::Reminder,
        TaskField::Recurrence,
        TaskField::Categories,
        TaskField::Importance,
        TaskField::Steps,
        TaskField::StartAt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskField::Title => "title",
            TaskField::Notes => "notes",
            TaskField::DueAt => "dueAt",
            TaskField::DueTime => "dueTime",
            TaskField::Status => "status",
            TaskField::Reminder => "reminder",
            TaskField::Recurrence => "recurrence",
            TaskField::Categories => "categories",
            TaskField::Importance => "importance",
            TaskField::Steps => "steps",
            TaskField::StartAt => "startAt",
        }
    }
}

impl fmt::Display for TaskField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Nullish collapse: `None` and empty are one equivalence class.
fn collapse(value: &Option<String>) -> Option<&str> {
    match value {
        Some(s) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Notes compare trimmed; whitespace-only collapses to absent.
fn normalized_notes(value: &Option<String>) -> Option<&str> {
    match value {
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        None => None,
    }
}

/// Dates compare by `YYYY-MM-DD` prefix only.
fn date_prefix(value: &Option<String>) -> Option<&str> {
    collapse(value).map(|s| {
        let end = s.char_indices().nth(10).map(|(i, _)| i).unwrap_or(s.len());
        &s[..end]
    })
}

/// Categories are a set: order and duplicates are not significant.
fn canonical_categories(values: &[String]) -> Vec<&str> {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

/// Semantic equality of one field between two task views.
pub fn field_equal(field: TaskField, a: &CanonicalTask, b: &CanonicalTask) -> bool {
    match field {
        TaskField::Title => a.title == b.title,
        TaskField::Notes => normalized_notes(&a.notes) == normalized_notes(&b.notes),
        TaskField::DueAt => date_prefix(&a.due_at) == date_prefix(&b.due_at),
        TaskField::DueTime => collapse(&a.due_time) == collapse(&b.due_time),
        TaskField::Status => a.status == b.status,
        TaskField::Reminder => collapse(&a.reminder) == collapse(&b.reminder),
        TaskField::Recurrence => collapse(&a.recurrence) == collapse(&b.recurrence),
        TaskField::Categories => {
            canonical_categories(&a.categories) == canonical_categories(&b.categories)
        }
        TaskField::Importance => a.importance == b.importance,
        TaskField::Steps => a.steps == b.steps,
        TaskField::StartAt => date_prefix(&a.start_at) == date_prefix(&b.start_at),
    }
}

/// Copy one field from `src` into `dst`.
pub fn copy_field(field: TaskField, dst: &mut CanonicalTask, src: &CanonicalTask) {
    match field {
        TaskField::Title => dst.title = src.title.clone(),
        TaskField::Notes => dst.notes = src.notes.clone(),
        TaskField::DueAt => dst.due_at = src.due_at.clone(),
        TaskField::DueTime => dst.due_time = src.due_time.clone(),
        TaskField::Status => dst.status = src.status,
        TaskField::Reminder => dst.reminder = src.reminder.clone(),
        TaskField::Recurrence => dst.recurrence = src.recurrence.clone(),
        TaskField::Categories => dst.categories = src.categories.clone(),
        TaskField::Importance => dst.importance = src.importance,
        TaskField::Steps => dst.steps = src.steps.clone(),
        TaskField::StartAt => dst.start_at = src.start_at.clone(),
    }
}

/// JSON view of one field, for conflict records.
pub fn field_value(field: TaskField, task: &CanonicalTask) -> serde_json::Value {
    match field {
        TaskField::Title => serde_json::json!(task.title),
        TaskField::Notes => serde_json::json!(task.notes),
        TaskField::DueAt => serde_json::json!(task.due_at),
        TaskField::DueTime => serde_json::json!(task.due_time),
        TaskField::Status => serde_json::json!(task.status),
        TaskField::Reminder => serde_json::json!(task.reminder),
        TaskField::Recurrence => serde_json::json!(task.recurrence),
        TaskField::Categories => serde_json::json!(task.categories),
        TaskField::Importance => serde_json::json!(task.importance),
        TaskField::Steps => serde_json::json!(task.steps),
        TaskField::StartAt => serde_json::json!(task.start_at),
    }
}

/// Whether every mergeable field of `a` and `b` is semantically equal.
pub fn tasks_equal(a: &CanonicalTask, b: &CanonicalTask) -> bool {
    TaskField::ALL.iter().all(|f| field_equal(*f, a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Step, TaskStatus};

    #[test]
    fn due_dates_compare_by_date_prefix() {
        let mut a = CanonicalTask::new("t");
        let mut b = CanonicalTask::new("t");
        a.due_at = Some("2026-03-01T00:00:00.000Z".to_string());
        b.due_at = Some("2026-03-01".to_string());
        assert!(field_equal(TaskField::DueAt, &a, &b));

        b.due_at = Some("2026-03-02".to_string());
        assert!(!field_equal(TaskField::DueAt, &a, &b));
    }

    #[test]
    fn notes_compare_trimmed_and_collapse_empty() {
        let mut a = CanonicalTask::new("t");
        let mut b = CanonicalTask::new("t");
        a.notes = Some("  shopping list \n".to_string());
        b.notes = Some("shopping list".to_string());
        assert!(field_equal(TaskField::Notes, &a, &b));

        a.notes = Some("   ".to_string());
        b.notes = None;
        assert!(field_equal(TaskField::Notes, &a, &b));
    }

    #[test]
    fn optional_strings_collapse_nullish() {
        let mut a = CanonicalTask::new("t");
        let mut b = CanonicalTask::new("t");
        a.due_time = Some(String::new());
        b.due_time = None;
        assert!(field_equal(TaskField::DueTime, &a, &b));
    }

    #[test]
    fn categories_ignore_order_and_duplicates() {
        let mut a = CanonicalTask::new("t");
        let mut b = CanonicalTask::new("t");
        a.categories = vec!["home".to_string(), "urgent".to_string()];
        b.categories = vec![
            "urgent".to_string(),
            "home".to_string(),
            "home".to_string(),
        ];
        assert!(field_equal(TaskField::Categories, &a, &b));
    }

    #[test]
    fn steps_are_order_sensitive() {
        let step = |text: &str| Step {
            text: text.to_string(),
            checked: false,
        };
        let mut a = CanonicalTask::new("t");
        let mut b = CanonicalTask::new("t");
        a.steps = vec![step("one"), step("two")];
        b.steps = vec![step("two"), step("one")];
        assert!(!field_equal(TaskField::Steps, &a, &b));
    }

    #[test]
    fn tasks_equal_ignores_id_and_updated_at() {
        let mut a = CanonicalTask::new("t");
        let mut b = a.clone();
        b.id = "other".to_string();
        b.updated_at = chrono::Utc::now() + chrono::Duration::hours(1);
        assert!(tasks_equal(&a, &b));

        b.status = TaskStatus::Completed;
        assert!(!tasks_equal(&a, &b));
        a.status = TaskStatus::Completed;
        assert!(tasks_equal(&a, &b));
    }
}
