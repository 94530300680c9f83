//! Write fan-out: pushes a resolved canonical to every writable provider.
//!
//! Per mapping and per target provider: create when the mapping has no id
//! there, recreate when the recorded id vanished (unless tombstoned —
//! delete wins), update when any field differs semantically, otherwise
//! count a no-op. Write failures are recorded and implicitly retried next
//! cycle because the provider still differs from canonical.

use crate::config::SyncMode;
use crate::engine::fields;
use crate::engine::report::{ActionKind, ErrorStage, SyncAction, SyncReport};
use crate::engine::snapshot::SnapshotSet;
use crate::provider::TaskProvider;
use crate::state::SyncState;
use crate::task::CanonicalTask;
use std::sync::Arc;
use tracing::{debug, info};

/// Push `canonical` to every healthy, writable target of one mapping.
///
/// `state` is consulted for tombstones and updated with server-assigned ids.
#[allow(clippy::too_many_arguments)]
pub async fn fan_out_mapping(
    providers: &[Arc<dyn TaskProvider>],
    mode: SyncMode,
    snapshots: &SnapshotSet,
    state: &mut SyncState,
    canonical_id: &str,
    canonical: &CanonicalTask,
    dry_run: bool,
    report: &mut SyncReport,
) {
    if canonical.title.trim().is_empty() {
        // Empty titles are never persisted outward.
        debug!(canonical_id, "fan-out skipped: empty title");
        return;
    }

    for (index, provider) in providers.iter().enumerate() {
        if !mode.is_target(index) {
            continue;
        }
        let name = provider.name();
        if !snapshots.is_healthy(name) {
            continue;
        }

        let existing_id = state
            .mapping_by_canonical_id(canonical_id)
            .and_then(|m| m.by_provider.get(name).cloned());

        match existing_id {
            None => {
                write_task(
                    providers,
                    index,
                    state,
                    canonical_id,
                    canonical,
                    None,
                    ActionKind::Create,
                    dry_run,
                    report,
                )
                .await;
            }
            Some(id) => {
                let snapshot = match snapshots.get(name) {
                    Some(s) => s,
                    None => continue,
                };
                match snapshot.index.get(&id) {
                    None => {
                        if state.is_tombstoned(name, &id) {
                            // Delete wins: never resurrect a tombstoned id.
                            debug!(provider = name, task_id = %id, "recreate suppressed by tombstone");
                            continue;
                        }
                        write_task(
                            providers,
                            index,
                            state,
                            canonical_id,
                            canonical,
                            None,
                            ActionKind::Recreate,
                            dry_run,
                            report,
                        )
                        .await;
                    }
                    Some(current) => {
                        if fields::tasks_equal(canonical, current) {
                            report.counts.noops += 1;
                        } else {
                            write_task(
                                providers,
                                index,
                                state,
                                canonical_id,
                                canonical,
                                Some(id),
                                ActionKind::Update,
                                dry_run,
                                report,
                            )
                            .await;
                        }
                    }
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn write_task(
    providers: &[Arc<dyn TaskProvider>],
    index: usize,
    state: &mut SyncState,
    canonical_id: &str,
    canonical: &CanonicalTask,
    target_id: Option<String>,
    kind: ActionKind,
    dry_run: bool,
    report: &mut SyncReport,
) {
    let provider = &providers[index];
    let name = provider.name().to_string();

    if dry_run {
        report.record_action(SyncAction {
            kind,
            provider: name,
            canonical_id: canonical_id.to_string(),
            provider_task_id: target_id,
            title: Some(canonical.title.clone()),
        });
        return;
    }

    let mut input = canonical.clone();
    input.id = target_id.unwrap_or_default();

    match provider.upsert_task(&input).await {
        Ok(stored) => {
            state.upsert_provider_id(canonical_id, &name, &stored.id);
            info!(
                provider = %name,
                task_id = %stored.id,
                kind = ?kind,
                title = %canonical.title,
                "task written"
            );
            report.record_action(SyncAction {
                kind,
                provider: name,
                canonical_id: canonical_id.to_string(),
                provider_task_id: Some(stored.id),
                title: Some(canonical.title.clone()),
            });
        }
        Err(e) => {
            report.record_error(&name, ErrorStage::Write, e.to_string());
        }
    }
}
