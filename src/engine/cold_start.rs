//! First-run duplicate matching across providers.
//!
//! Before any watermark exists the engine cannot tell "same task created on
//! both sides" from "two different tasks", so the first cycle groups tasks
//! by normalized `(title, notes)` and links groups spanning providers into
//! one mapping instead of cross-creating duplicates.

use crate::engine::snapshot::SnapshotSet;
use crate::state::SyncState;
use crate::task::{CanonicalTask, TaskStatus};
use std::collections::BTreeMap;
use tracing::info;

/// Lowercase, trim, collapse internal whitespace.
fn normalize(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn match_key(task: &CanonicalTask) -> String {
    let notes = task.notes.as_deref().unwrap_or("");
    format!("{}\u{0}{}", normalize(&task.title), normalize(notes))
}

/// Link same-looking tasks across providers into shared mappings.
///
/// Only groups spanning at least two providers are linked; singletons are
/// picked up by the ordinary ensure-mapping pass. Returns the number of
/// mappings created.
pub fn run_cold_start(
    state: &mut SyncState,
    provider_order: &[String],
    snapshots: &SnapshotSet,
) -> usize {
    let mut groups: BTreeMap<String, Vec<(&str, &CanonicalTask)>> = BTreeMap::new();

    for name in provider_order {
        let Some(snapshot) = snapshots.get(name) else {
            continue;
        };
        if !snapshot.healthy {
            continue;
        }
        for task in &snapshot.all {
            if task.status == TaskStatus::Deleted {
                continue;
            }
            if state.is_tombstoned(name, &task.id) {
                continue;
            }
            groups
                .entry(match_key(task))
                .or_default()
                .push((name.as_str(), task));
        }
    }

    let mut created = 0;
    for (_, members) in groups {
        let distinct_providers = {
            let mut providers: Vec<&str> = members.iter().map(|(p, _)| *p).collect();
            providers.dedup();
            providers.len()
        };
        if distinct_providers < 2 {
            continue;
        }

        let (first_provider, first_task) = members[0];
        let canonical_id = state
            .ensure_mapping(first_provider, &first_task.id)
            .canonical_id
            .clone();
        for (provider, task) in &members[1..] {
            // One task id per provider; later same-provider duplicates get
            // their own mapping from the ensure pass.
            if state
                .mapping_by_canonical_id(&canonical_id)
                .map(|m| m.by_provider.contains_key(*provider))
                .unwrap_or(false)
            {
                continue;
            }
            state.upsert_provider_id(&canonical_id, provider, &task.id);
        }
        state.upsert_canonical_snapshot(&canonical_id, first_task.clone());
        created += 1;
    }

    if created > 0 {
        info!(mappings = created, "cold start linked matching tasks");
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_and_whitespace() {
        assert_eq!(normalize("  Buy   Milk \n"), "buy milk");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn match_key_joins_title_and_notes() {
        let mut a = CanonicalTask::new("Buy milk");
        a.notes = Some("2%  fat".to_string());
        let mut b = CanonicalTask::new("  buy MILK");
        b.notes = Some("2% fat".to_string());
        assert_eq!(match_key(&a), match_key(&b));

        b.notes = Some("skim".to_string());
        assert_ne!(match_key(&a), match_key(&b));
    }
}
