//! Notes metadata block for providers without native rich fields.
//!
//! Google Tasks carries only title/notes/due/status, so reminder,
//! recurrence, categories, importance, steps, start and due-time travel in
//! a fenced JSON block appended to the notes string. The block never leaks
//! into canonical notes; a malformed block is treated as plain text.

use crate::task::{CanonicalTask, Importance, Step};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Marker line opening the metadata block.
pub const METADATA_MARKER: &str = "--- tasksync:v1 ---";

/// The rich fields a lean provider cannot store natively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
}

impl MetadataBlock {
    /// Extract the rich fields of a canonical task.
    pub fn from_task(task: &CanonicalTask) -> Self {
        Self {
            due_time: task.due_time.clone(),
            reminder: task.reminder.clone(),
            recurrence: task.recurrence.clone(),
            start_at: task.start_at.clone(),
            categories: task.categories.clone(),
            importance: (task.importance != Importance::Normal).then_some(task.importance),
            steps: task.steps.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write the carried fields back onto a canonical task.
    pub fn apply(self, task: &mut CanonicalTask) {
        task.due_time = self.due_time;
        task.reminder = self.reminder;
        task.recurrence = self.recurrence;
        task.start_at = self.start_at;
        task.categories = self.categories;
        if let Some(importance) = self.importance {
            task.importance = importance;
        }
        task.steps = self.steps;
    }
}

/// Build the provider-facing notes string: body plus optional block.
pub fn encode_notes(notes: Option<&str>, block: &MetadataBlock) -> Option<String> {
    let body = notes.unwrap_or("").trim_end();
    if block.is_empty() {
        return if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        };
    }
    // Serializing a struct of plain fields cannot fail.
    let json = serde_json::to_string(block).unwrap_or_default();
    if body.is_empty() {
        Some(format!("{METADATA_MARKER}\n{json}"))
    } else {
        Some(format!("{body}\n\n{METADATA_MARKER}\n{json}"))
    }
}

/// Split a provider notes string into canonical notes and the carried block.
pub fn decode_notes(raw: Option<&str>) -> (Option<String>, MetadataBlock) {
    let Some(raw) = raw else {
        return (None, MetadataBlock::default());
    };

    let Some(pos) = raw.find(METADATA_MARKER) else {
        let body = raw.trim_end();
        return (
            (!body.is_empty()).then(|| body.to_string()),
            MetadataBlock::default(),
        );
    };

    let body = raw[..pos].trim_end();
    let after = &raw[pos + METADATA_MARKER.len()..];
    match serde_json::from_str::<MetadataBlock>(after.trim()) {
        Ok(block) => (
            (!body.is_empty()).then(|| body.to_string()),
            block,
        ),
        Err(e) => {
            debug!(error = %e, "unparsable metadata block kept as notes text");
            let body = raw.trim_end();
            (
                (!body.is_empty()).then(|| body.to_string()),
                MetadataBlock::default(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rich_task() -> CanonicalTask {
        let mut task = CanonicalTask::new("T");
        task.notes = Some("remember the list".to_string());
        task.due_time = Some("09:30".to_string());
        task.importance = Importance::High;
        task.categories = vec!["home".to_string()];
        task.steps = vec![Step {
            text: "step one".to_string(),
            checked: true,
        }];
        task
    }

    #[test]
    fn round_trip_preserves_rich_fields() {
        let task = rich_task();
        let block = MetadataBlock::from_task(&task);
        let encoded = encode_notes(task.notes.as_deref(), &block);

        let (notes, decoded) = decode_notes(encoded.as_deref());
        assert_eq!(notes.as_deref(), Some("remember the list"));
        assert_eq!(decoded, block);

        let mut restored = CanonicalTask::new("T");
        restored.notes = notes;
        decoded.apply(&mut restored);
        assert_eq!(restored.due_time.as_deref(), Some("09:30"));
        assert_eq!(restored.importance, Importance::High);
        assert_eq!(restored.steps.len(), 1);
    }

    #[test]
    fn empty_block_leaves_notes_alone() {
        let block = MetadataBlock::default();
        assert_eq!(
            encode_notes(Some("plain notes"), &block).as_deref(),
            Some("plain notes")
        );
        assert_eq!(encode_notes(None, &block), None);
    }

    #[test]
    fn plain_notes_decode_without_block() {
        let (notes, block) = decode_notes(Some("just text"));
        assert_eq!(notes.as_deref(), Some("just text"));
        assert!(block.is_empty());
    }

    #[test]
    fn malformed_block_is_kept_as_text() {
        let raw = format!("body\n\n{METADATA_MARKER}\nnot json");
        let (notes, block) = decode_notes(Some(&raw));
        assert!(block.is_empty());
        assert!(notes.unwrap().contains("not json"));
    }

    #[test]
    fn block_without_body_yields_no_notes() {
        let mut task = CanonicalTask::new("T");
        task.due_time = Some("08:00".to_string());
        let block = MetadataBlock::from_task(&task);
        let encoded = encode_notes(None, &block).unwrap();
        assert!(encoded.starts_with(METADATA_MARKER));

        let (notes, decoded) = decode_notes(Some(&encoded));
        assert!(notes.is_none());
        assert_eq!(decoded.due_time.as_deref(), Some("08:00"));
    }
}
