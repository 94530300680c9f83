//! Per-cycle provider snapshot collection.
//!
//! Each provider is asked for two lists in parallel: changes since the
//! watermark and the full inventory. Failures are recorded per stage; a
//! provider whose full listing failed is unhealthy for the cycle and its
//! mappings are left untouched.

use crate::engine::report::{ErrorStage, SyncErrorRecord};
use crate::provider::TaskProvider;
use crate::task::{CanonicalTask, TaskStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// One provider's view of the world this cycle.
pub struct ProviderSnapshot {
    /// Tasks modified since the watermark. Empty when the call failed.
    pub changes: Vec<CanonicalTask>,
    /// Full inventory; the basis of `index`.
    pub all: Vec<CanonicalTask>,
    /// Provider-local id → current task, from the full inventory.
    pub index: HashMap<String, CanonicalTask>,
    /// Ids present in `changes`, for contender gating.
    pub changed_ids: HashSet<String>,
    /// Whether the change feed succeeded.
    pub changes_ok: bool,
    /// Whether the full listing succeeded. Unhealthy providers sit out.
    pub healthy: bool,
}

impl ProviderSnapshot {
    fn unhealthy() -> Self {
        Self {
            changes: Vec::new(),
            all: Vec::new(),
            index: HashMap::new(),
            changed_ids: HashSet::new(),
            changes_ok: false,
            healthy: false,
        }
    }
}

/// Snapshots for every configured provider, healthy or not.
pub struct SnapshotSet {
    by_provider: HashMap<String, ProviderSnapshot>,
}

impl SnapshotSet {
    pub fn get(&self, provider: &str) -> Option<&ProviderSnapshot> {
        self.by_provider.get(provider)
    }

    pub fn is_healthy(&self, provider: &str) -> bool {
        self.by_provider
            .get(provider)
            .map(|s| s.healthy)
            .unwrap_or(false)
    }

    /// Whether the provider currently holds `id` as a live (non-deleted) task.
    pub fn holds_live(&self, provider: &str, id: &str) -> bool {
        self.by_provider
            .get(provider)
            .and_then(|s| s.index.get(id))
            .map(|t| t.status != TaskStatus::Deleted)
            .unwrap_or(false)
    }
}

/// Fetch `(changes, all)` from every provider concurrently.
pub async fn collect_snapshots(
    providers: &[Arc<dyn TaskProvider>],
    since: Option<DateTime<Utc>>,
    errors: &mut Vec<SyncErrorRecord>,
) -> SnapshotSet {
    let fetches = providers.iter().map(|provider| {
        let provider = Arc::clone(provider);
        async move {
            let (changes, all) =
                tokio::join!(provider.list_tasks(since), provider.list_tasks(None));
            (provider.name().to_string(), changes, all)
        }
    });

    let mut by_provider = HashMap::new();
    for (name, changes_res, all_res) in futures::future::join_all(fetches).await {
        let snapshot = match all_res {
            Ok(all) => {
                let (changes, changes_ok) = match changes_res {
                    Ok(changes) => (changes, true),
                    Err(e) => {
                        warn!(provider = %name, error = %e, "change listing failed");
                        errors.push(SyncErrorRecord {
                            provider: name.clone(),
                            stage: ErrorStage::ListChanges,
                            message: e.to_string(),
                        });
                        (Vec::new(), false)
                    }
                };
                let index: HashMap<String, CanonicalTask> = all
                    .iter()
                    .map(|t| (t.id.clone(), t.clone()))
                    .collect();
                let changed_ids = changes.iter().map(|t| t.id.clone()).collect();
                debug!(
                    provider = %name,
                    total = all.len(),
                    changed = changes.len(),
                    "snapshot collected"
                );
                ProviderSnapshot {
                    changes,
                    all,
                    index,
                    changed_ids,
                    changes_ok,
                    healthy: true,
                }
            }
            Err(e) => {
                warn!(provider = %name, error = %e, "full listing failed, provider unhealthy this cycle");
                errors.push(SyncErrorRecord {
                    provider: name.clone(),
                    stage: ErrorStage::ListAll,
                    message: e.to_string(),
                });
                // The change feed result is moot without an inventory.
                ProviderSnapshot::unhealthy()
            }
        };
        by_provider.insert(name, snapshot);
    }

    SnapshotSet { by_provider }
}
