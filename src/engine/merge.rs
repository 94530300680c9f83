//! Per-field merge of provider views against the canonical baseline.
//!
//! For each field, the contenders are the providers whose current view
//! differs semantically from the baseline. Zero contenders keep the
//! baseline, one contender wins outright, and multiple contenders resolve
//! by latest `updated_at` (ties break by configured provider order), with a
//! conflict record emitted for the audit log.

use crate::engine::fields::{self, TaskField};
use crate::engine::report::SyncConflict;
use crate::task::CanonicalTask;
use tracing::debug;

/// One provider's current view of a mapped task.
pub struct MergeInput<'a> {
    pub provider: &'a str,
    pub task: &'a CanonicalTask,
    /// Whether this view may contend: the task appeared in the provider's
    /// change feed this cycle (or the feed failed and the full view is the
    /// only evidence). A stale view that merely lags the baseline — e.g.
    /// after a missed write — must not contend, or it would revert edits
    /// instead of receiving them on the retry path.
    pub fresh: bool,
}

pub struct MergeOutcome {
    pub canonical: CanonicalTask,
    pub conflicts: Vec<SyncConflict>,
}

/// Resolve the new canonical for one mapping.
///
/// `inputs` must be in configured provider order and non-empty. Without a
/// baseline the canonical seeds from the first input and every view is
/// diffed against that seed.
pub fn merge_mapping(
    canonical_id: &str,
    baseline: Option<&CanonicalTask>,
    inputs: &[MergeInput<'_>],
) -> MergeOutcome {
    let seed = match baseline {
        Some(b) => b.clone(),
        None => inputs[0].task.without_id(),
    };
    let no_baseline = baseline.is_none();

    let changed: Vec<(usize, Vec<TaskField>)> = inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| no_baseline || input.fresh)
        .map(|(i, input)| {
            let fields: Vec<TaskField> = TaskField::ALL
                .iter()
                .copied()
                .filter(|f| !fields::field_equal(*f, &seed, input.task))
                .collect();
            (i, fields)
        })
        .collect();

    let mut canonical = seed;
    let mut conflicts = Vec::new();

    for field in TaskField::ALL {
        let mut contenders: Vec<usize> = changed
            .iter()
            .filter(|(_, fields)| fields.contains(&field))
            .map(|(i, _)| *i)
            .collect();

        // An empty title never wins; the canonical title stays non-empty.
        if field == TaskField::Title {
            contenders.retain(|&i| !inputs[i].task.title.trim().is_empty());
        }

        match contenders.len() {
            0 => {}
            1 => {
                let input = &inputs[contenders[0]];
                fields::copy_field(field, &mut canonical, input.task);
                canonical.updated_at = input.task.updated_at;
            }
            _ => {
                // Stable sort: ties on updated_at keep provider order.
                contenders.sort_by(|&a, &b| {
                    inputs[b]
                        .task
                        .updated_at
                        .cmp(&inputs[a].task.updated_at)
                });
                let winner = &inputs[contenders[0]];
                fields::copy_field(field, &mut canonical, winner.task);
                canonical.updated_at = winner.task.updated_at;

                let conflict = SyncConflict {
                    canonical_id: canonical_id.to_string(),
                    field,
                    providers: contenders
                        .iter()
                        .map(|&i| inputs[i].provider.to_string())
                        .collect(),
                    winner: winner.provider.to_string(),
                    overwritten: contenders[1..]
                        .iter()
                        .map(|&i| inputs[i].provider.to_string())
                        .collect(),
                    value: fields::field_value(field, winner.task),
                };
                debug!(
                    canonical_id,
                    field = %field,
                    winner = winner.provider,
                    "field conflict resolved by last write"
                );
                conflicts.push(conflict);
            }
        }
    }

    MergeOutcome {
        canonical,
        conflicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use chrono::{Duration, Utc};

    fn task(title: &str, notes: Option<&str>, minutes_ago: i64) -> CanonicalTask {
        let mut t = CanonicalTask::new(title);
        t.notes = notes.map(str::to_string);
        t.updated_at = Utc::now() - Duration::minutes(minutes_ago);
        t
    }

    #[test]
    fn disjoint_changes_both_adopted() {
        let baseline = task("T", Some("n0"), 60);
        let a = task("T2", Some("n0"), 10);
        let b = task("T", Some("n1"), 20);

        let outcome = merge_mapping(
            "c1",
            Some(&baseline),
            &[
                MergeInput {
                    provider: "google",
                    task: &a,
                    fresh: true,
                },
                MergeInput {
                    provider: "microsoft",
                    task: &b,
                    fresh: true,
                },
            ],
        );

        assert_eq!(outcome.canonical.title, "T2");
        assert_eq!(outcome.canonical.notes.as_deref(), Some("n1"));
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn same_field_conflict_latest_wins() {
        let baseline = task("T", None, 60);
        let a = task("Ta", None, 20);
        let b = task("Tb", None, 10);

        let outcome = merge_mapping(
            "c1",
            Some(&baseline),
            &[
                MergeInput {
                    provider: "google",
                    task: &a,
                    fresh: true,
                },
                MergeInput {
                    provider: "microsoft",
                    task: &b,
                    fresh: true,
                },
            ],
        );

        assert_eq!(outcome.canonical.title, "Tb");
        assert_eq!(outcome.conflicts.len(), 1);
        let conflict = &outcome.conflicts[0];
        assert_eq!(conflict.field, TaskField::Title);
        assert_eq!(conflict.winner, "microsoft");
        assert_eq!(conflict.overwritten, vec!["google".to_string()]);
    }

    #[test]
    fn conflict_tie_breaks_by_provider_order() {
        let baseline = task("T", None, 60);
        let at = Utc::now();
        let mut a = task("Ta", None, 0);
        let mut b = task("Tb", None, 0);
        a.updated_at = at;
        b.updated_at = at;

        let outcome = merge_mapping(
            "c1",
            Some(&baseline),
            &[
                MergeInput {
                    provider: "google",
                    task: &a,
                    fresh: true,
                },
                MergeInput {
                    provider: "microsoft",
                    task: &b,
                    fresh: true,
                },
            ],
        );

        assert_eq!(outcome.canonical.title, "Ta");
        assert_eq!(outcome.conflicts[0].winner, "google");
    }

    #[test]
    fn stale_view_does_not_contend() {
        // Baseline already carries the newer title; the stale provider view
        // lags because a write to it failed last cycle.
        let baseline = task("T2", None, 5);
        let stale = task("T", None, 120);

        let outcome = merge_mapping(
            "c1",
            Some(&baseline),
            &[MergeInput {
                provider: "microsoft",
                task: &stale,
                fresh: false,
            }],
        );

        assert_eq!(outcome.canonical.title, "T2");
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn no_baseline_seeds_from_first_provider() {
        let a = task("from-a", Some("note"), 30);
        let b = task("from-a", Some("note"), 40);

        let outcome = merge_mapping(
            "c1",
            None,
            &[
                MergeInput {
                    provider: "google",
                    task: &a,
                    fresh: false,
                },
                MergeInput {
                    provider: "microsoft",
                    task: &b,
                    fresh: false,
                },
            ],
        );

        assert_eq!(outcome.canonical.title, "from-a");
        assert!(outcome.canonical.id.is_empty());
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn empty_title_never_wins() {
        let baseline = task("keep me", None, 60);
        let blank = task("   ", None, 1);

        let outcome = merge_mapping(
            "c1",
            Some(&baseline),
            &[MergeInput {
                provider: "google",
                task: &blank,
                fresh: true,
            }],
        );

        assert_eq!(outcome.canonical.title, "keep me");
    }

    #[test]
    fn completion_propagates_as_field_change() {
        let baseline = task("T", None, 60);
        let mut done = task("T", None, 1);
        done.status = TaskStatus::Completed;

        let outcome = merge_mapping(
            "c1",
            Some(&baseline),
            &[MergeInput {
                provider: "google",
                task: &done,
                fresh: true,
            }],
        );

        assert_eq!(outcome.canonical.status, TaskStatus::Completed);
    }
}
