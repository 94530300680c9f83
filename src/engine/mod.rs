//! Cycle orchestration: lock, load, reconcile, fan out, persist.
//!
//! A cycle is linear and single-threaded apart from the parallel snapshot
//! fetch; state between cycles flows exclusively through the on-disk
//! document, guarded by the cycle lock.

pub mod cold_start;
pub mod deletion;
pub mod fanout;
pub mod fields;
pub mod merge;
pub mod report;
pub mod snapshot;

use crate::config::SyncConfig;
use crate::error::{EngineError, EngineResult};
use crate::provider::TaskProvider;
use crate::state::{ConflictLog, CycleLock, StateStore};
use crate::task::{CanonicalTask, TaskStatus};
use chrono::Utc;
use merge::MergeInput;
use report::{ActionCounts, SyncReport};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The reconciliation engine. One instance drives one state directory.
pub struct SyncEngine {
    providers: Vec<Arc<dyn TaskProvider>>,
    store: StateStore,
    conflict_log: ConflictLog,
    config: SyncConfig,
}

impl SyncEngine {
    /// Build an engine over an ordered provider list.
    ///
    /// Provider order is significant: the first provider is the privileged
    /// side in one-way modes and wins last-write ties.
    pub fn new(providers: Vec<Arc<dyn TaskProvider>>, config: SyncConfig) -> EngineResult<Self> {
        config.validate()?;
        if providers.is_empty() {
            return Err(EngineError::config("at least one provider is required"));
        }
        let mut seen = HashSet::new();
        for provider in &providers {
            if !seen.insert(provider.name().to_string()) {
                return Err(EngineError::config(format!(
                    "duplicate provider name: {}",
                    provider.name()
                )));
            }
        }

        let store = StateStore::new(&config.state_dir);
        let conflict_log = ConflictLog::new(store.conflict_log_path());
        Ok(Self {
            providers,
            store,
            conflict_log,
            config,
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one reconciliation cycle under the state-directory lock.
    pub async fn run_cycle(&self) -> EngineResult<SyncReport> {
        let started = std::time::Instant::now();
        let _lock = CycleLock::acquire(self.store.dir())?;

        let mut state = self.store.load().await?;
        let now = Utc::now();
        let pruned = state.prune_expired_tombstones(self.config.tombstone_ttl_days, now);
        if pruned > 0 {
            debug!(pruned, "expired tombstones pruned");
        }

        let previous_sync_at = state.last_sync_at;
        let mode = self.config.mode;
        let dry_run = self.config.dry_run;

        let mut report = SyncReport {
            mode,
            providers: Vec::new(),
            previous_sync_at,
            new_sync_at: now,
            dry_run,
            counts: ActionCounts::default(),
            actions: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
        };

        let snapshots =
            snapshot::collect_snapshots(&self.providers, previous_sync_at, &mut report.errors)
                .await;

        let provider_names: Vec<String> =
            self.providers.iter().map(|p| p.name().to_string()).collect();
        report.providers = provider_names
            .iter()
            .filter(|n| snapshots.is_healthy(n))
            .cloned()
            .collect();

        let source_names: Vec<String> = self
            .providers
            .iter()
            .enumerate()
            .filter(|(i, p)| mode.is_source(*i) && snapshots.is_healthy(p.name()))
            .map(|(_, p)| p.name().to_string())
            .collect();

        if previous_sync_at.is_none() && state.mappings.is_empty() {
            cold_start::run_cold_start(&mut state, &provider_names, &snapshots);
        }

        // Deletion resolution runs before any field-level write: delete wins.
        let mut condemned =
            deletion::resolve_intentional_deletes(&mut state, &source_names, &snapshots, now);
        if previous_sync_at.is_some() {
            condemned.extend(deletion::sweep_external_deletes(
                &mut state,
                &source_names,
                &snapshots,
                now,
            ));
        }
        deletion::propagate_deletes(
            &self.providers,
            mode,
            &snapshots,
            &state,
            dry_run,
            &mut report,
        )
        .await;
        let mut condemned: Vec<String> = condemned.into_iter().collect();
        condemned.sort();
        for canonical_id in &condemned {
            state.remove_mapping(canonical_id);
        }

        // Every observed live task gets a mapping before the field pass.
        for (index, provider) in self.providers.iter().enumerate() {
            if !mode.is_source(index) {
                continue;
            }
            let name = provider.name();
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
                state.ensure_mapping(name, &task.id);
            }
        }

        // Field-level merge and fan-out, mapping by mapping.
        let canonical_ids: Vec<String> = state
            .mappings
            .iter()
            .map(|m| m.canonical_id.clone())
            .collect();
        for canonical_id in canonical_ids {
            let Some(mapping) = state.mapping_by_canonical_id(&canonical_id) else {
                continue;
            };
            if mapping
                .by_provider
                .iter()
                .any(|(p, id)| state.is_tombstoned(p, id))
            {
                continue;
            }

            let baseline = mapping.canonical.clone();
            let mut views: Vec<(String, CanonicalTask, bool)> = Vec::new();
            for (index, provider) in self.providers.iter().enumerate() {
                if !mode.is_source(index) {
                    continue;
                }
                let name = provider.name();
                let Some(snapshot) = snapshots.get(name) else {
                    continue;
                };
                if !snapshot.healthy {
                    continue;
                }
                let Some(id) = mapping.by_provider.get(name) else {
                    continue;
                };
                let Some(task) = snapshot.index.get(id) else {
                    continue;
                };
                if task.status == TaskStatus::Deleted {
                    continue;
                }
                let fresh = !snapshot.changes_ok || snapshot.changed_ids.contains(id);
                views.push((name.to_string(), task.clone(), fresh));
            }
            if views.is_empty() {
                continue;
            }

            let inputs: Vec<MergeInput<'_>> = views
                .iter()
                .map(|(name, task, fresh)| MergeInput {
                    provider: name,
                    task,
                    fresh: *fresh,
                })
                .collect();
            let outcome = merge::merge_mapping(&canonical_id, baseline.as_ref(), &inputs);

            // Baseline mutates in memory before fan-out reads it; on dry-run
            // it never reaches disk.
            let baseline_stale = baseline
                .as_ref()
                .map(|b| !fields::tasks_equal(b, &outcome.canonical))
                .unwrap_or(true);
            if baseline_stale {
                state.upsert_canonical_snapshot(&canonical_id, outcome.canonical.clone());
            }
            report.conflicts.extend(outcome.conflicts);

            fanout::fan_out_mapping(
                &self.providers,
                mode,
                &snapshots,
                &mut state,
                &canonical_id,
                &outcome.canonical,
                dry_run,
                &mut report,
            )
            .await;
        }

        // Watermark advances only after all reconciliation completed, and
        // never moves backwards.
        let mut new_sync_at = Utc::now();
        if let Some(previous) = previous_sync_at {
            if new_sync_at < previous {
                new_sync_at = previous;
            }
        }
        state.last_sync_at = Some(new_sync_at);
        report.new_sync_at = new_sync_at;

        state.mappings.retain(|m| !m.by_provider.is_empty());

        if !dry_run {
            self.conflict_log.append(new_sync_at, &report.conflicts);
            self.store.save(&state).await?;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(summary = %report.summary(), "cycle complete");
        Ok(report)
    }

    /// Run cycles forever at the configured interval.
    ///
    /// Lock contention and cycle failures are logged; the loop keeps going.
    pub async fn run_poll_loop(&self) -> EngineResult<()> {
        let minutes = self
            .config
            .poll_interval_minutes
            .ok_or_else(|| EngineError::config("poll interval not configured"))?;
        let interval = Duration::from_secs(minutes * 60);
        info!(minutes, "polling started");

        loop {
            match self.run_cycle().await {
                Ok(report) => {
                    if !report.errors.is_empty() {
                        warn!(errors = report.errors.len(), "cycle finished with errors");
                    }
                }
                Err(EngineError::LockHeld { pid }) => {
                    warn!(pid, "cycle skipped, lock held by peer");
                }
                Err(e) => {
                    error!(error = %e, "cycle failed");
                }
            }
            tokio::time::sleep(interval).await;
        }
    }
}
