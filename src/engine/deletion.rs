//! Delete-wins resolution: tombstoning and delete propagation.
//!
//! Two paths feed this module: tasks a provider explicitly reports as
//! deleted, and mapped ids that have disappeared from a provider's full
//! inventory. Both tombstone every side of the mapping before any
//! field-level write happens, so deletion always beats update within a
//! cycle. Propagation is driven off the tombstone table itself, which makes
//! failed deletes retry on later cycles.

use crate::config::SyncMode;
use crate::engine::report::{ActionKind, ErrorStage, SyncAction, SyncReport};
use crate::engine::snapshot::SnapshotSet;
use crate::provider::TaskProvider;
use crate::state::SyncState;
use crate::task::TaskStatus;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Path (a): a provider's change feed reports `status = deleted`.
///
/// Tombstones every side of the affected mapping. Returns the canonical ids
/// whose mappings are now condemned.
pub fn resolve_intentional_deletes(
    state: &mut SyncState,
    source_providers: &[String],
    snapshots: &SnapshotSet,
    now: DateTime<Utc>,
) -> HashSet<String> {
    let mut condemned = HashSet::new();

    for name in source_providers {
        let Some(snapshot) = snapshots.get(name) else {
            continue;
        };
        for task in &snapshot.changes {
            if task.status != TaskStatus::Deleted {
                continue;
            }
            let mapping = state.ensure_mapping(name, &task.id);
            let canonical_id = mapping.canonical_id.clone();
            let sides: Vec<(String, String)> = mapping
                .by_provider
                .iter()
                .map(|(p, id)| (p.clone(), id.clone()))
                .collect();
            for (provider, id) in sides {
                state.add_tombstone(&provider, &id, now);
            }
            debug!(provider = %name, task_id = %task.id, %canonical_id, "intentional delete observed");
            condemned.insert(canonical_id);
        }
    }

    condemned
}

/// Path (b): infer deletions from absence in full inventories.
///
/// Only mappings with a stored baseline are considered, and only when every
/// side sits on a healthy provider (an unhealthy provider's absence proves
/// nothing). Partially missing mappings are external deletes and propagate;
/// fully missing mappings are orphans and are dropped outright.
pub fn sweep_external_deletes(
    state: &mut SyncState,
    source_providers: &[String],
    snapshots: &SnapshotSet,
    now: DateTime<Utc>,
) -> HashSet<String> {
    let mut condemned = HashSet::new();
    let mut orphans = Vec::new();

    let candidates: Vec<(String, Vec<(String, String)>)> = state
        .mappings
        .iter()
        .filter(|m| m.canonical.is_some())
        .map(|m| {
            (
                m.canonical_id.clone(),
                m.by_provider
                    .iter()
                    .map(|(p, id)| (p.clone(), id.clone()))
                    .collect(),
            )
        })
        .collect();

    for (canonical_id, sides) in candidates {
        if sides.iter().any(|(p, _)| !snapshots.is_healthy(p)) {
            continue;
        }

        let (present, missing): (Vec<_>, Vec<_>) = sides
            .iter()
            .partition(|(p, id)| snapshots.get(p).map(|s| s.index.contains_key(id)).unwrap_or(false));

        if missing.is_empty() {
            continue;
        }

        if present.is_empty() {
            // Pure orphan: every side is gone, nothing left to delete remotely.
            for (provider, id) in &sides {
                state.add_tombstone(provider, id, now);
            }
            orphans.push(canonical_id);
            continue;
        }

        // A disappearance on a write-only target is drift, not a delete;
        // the fan-out recreates it from canonical.
        let missing_on_source = missing
            .iter()
            .any(|(p, _)| source_providers.iter().any(|s| s == p));
        if !missing_on_source {
            continue;
        }

        for (provider, id) in &sides {
            state.add_tombstone(provider, id, now);
        }
        debug!(%canonical_id, "external delete inferred from absence");
        condemned.insert(canonical_id);
    }

    for canonical_id in &orphans {
        info!(%canonical_id, "orphan mapping removed");
        state.remove_mapping(canonical_id);
    }

    condemned
}

/// Issue `deleteTask` for every tombstoned id a writable, healthy provider
/// still holds live. Failures are recorded and retried on later cycles
/// because the tombstone outlives them.
pub async fn propagate_deletes(
    providers: &[Arc<dyn TaskProvider>],
    mode: SyncMode,
    snapshots: &SnapshotSet,
    state: &SyncState,
    dry_run: bool,
    report: &mut SyncReport,
) {
    for tombstone in &state.tombstones {
        let Some(index) = providers
            .iter()
            .position(|p| p.name() == tombstone.provider)
        else {
            continue;
        };
        if !mode.is_target(index) {
            continue;
        }
        if !snapshots.is_healthy(&tombstone.provider) {
            continue;
        }
        if !snapshots.holds_live(&tombstone.provider, &tombstone.id) {
            continue;
        }

        let canonical_id = state
            .find_mapping(&tombstone.provider, &tombstone.id)
            .map(|m| m.canonical_id.clone())
            .unwrap_or_default();

        if dry_run {
            report.record_action(SyncAction {
                kind: ActionKind::Delete,
                provider: tombstone.provider.clone(),
                canonical_id,
                provider_task_id: Some(tombstone.id.clone()),
                title: None,
            });
            continue;
        }

        match providers[index].delete_task(&tombstone.id).await {
            Ok(()) => {
                info!(provider = %tombstone.provider, task_id = %tombstone.id, "deleted");
                report.record_action(SyncAction {
                    kind: ActionKind::Delete,
                    provider: tombstone.provider.clone(),
                    canonical_id,
                    provider_task_id: Some(tombstone.id.clone()),
                    title: None,
                });
            }
            Err(e) => {
                report.record_error(&tombstone.provider, ErrorStage::Write, e.to_string());
            }
        }
    }
}
