//! Persistent sync state: mappings, tombstones, and the watermark.
//!
//! The state is one logical JSON document (see [`store::StateStore`] for the
//! on-disk contract). Everything in this module is pure in-memory
//! manipulation so the reconciliation invariants can be tested without IO.

pub mod conflict_log;
pub mod lock;
pub mod store;

pub use conflict_log::ConflictLog;
pub use lock::CycleLock;
pub use store::StateStore;

use crate::task::{unix_epoch, CanonicalTask};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current schema version of the persisted document.
pub const STATE_VERSION: u32 = 1;

/// Identity record linking one canonical task to its provider-local ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    /// Assigned once, never changes.
    pub canonical_id: String,
    /// Provider tag → opaque provider-local id.
    #[serde(default)]
    pub by_provider: BTreeMap<String, String>,
    /// Last successfully reconciled canonical, the baseline for three-way
    /// diffs. Absent until the first merge touches the mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<CanonicalTask>,
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Mapping {
    fn new(provider: &str, id: &str) -> Self {
        let mut by_provider = BTreeMap::new();
        by_provider.insert(provider.to_string(), id.to_string());
        Self {
            canonical_id: Uuid::new_v4().to_string(),
            by_provider,
            canonical: None,
            updated_at: Utc::now(),
        }
    }
}

/// Forbids (re)creation of a provider id for a TTL window after a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub provider: String,
    pub id: String,
    pub deleted_at: DateTime<Utc>,
}

/// The persisted document: watermark, mappings, tombstones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Missing in v0 documents; [`SyncState::migrate`] fills it in.
    #[serde(default)]
    pub version: u32,
    /// Change-since watermark; absent until the first successful cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub tombstones: Vec<Tombstone>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_sync_at: None,
            mappings: Vec::new(),
            tombstones: Vec::new(),
        }
    }
}

impl SyncState {
    /// Upgrade a v0 document (no `version` field) to v1.
    ///
    /// Serde defaults already normalize missing `byProvider` and `updatedAt`
    /// fields; migration drops mappings left without any provider id and
    /// stamps the version. Returns whether anything was upgraded.
    pub fn migrate(&mut self) -> bool {
        if self.version >= STATE_VERSION {
            return false;
        }
        self.mappings.retain(|m| !m.by_provider.is_empty());
        self.version = STATE_VERSION;
        true
    }

    /// Find the mapping holding `(provider, id)`.
    pub fn find_mapping(&self, provider: &str, id: &str) -> Option<&Mapping> {
        self.mappings
            .iter()
            .find(|m| m.by_provider.get(provider).map(String::as_str) == Some(id))
    }

    pub fn mapping_by_canonical_id(&self, canonical_id: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.canonical_id == canonical_id)
    }

    pub fn mapping_by_canonical_id_mut(&mut self, canonical_id: &str) -> Option<&mut Mapping> {
        self.mappings
            .iter_mut()
            .find(|m| m.canonical_id == canonical_id)
    }

    /// Return the mapping holding `(provider, id)`, inserting one with a
    /// fresh canonical id when none exists. Idempotent.
    pub fn ensure_mapping(&mut self, provider: &str, id: &str) -> &mut Mapping {
        if let Some(pos) = self
            .mappings
            .iter()
            .position(|m| m.by_provider.get(provider).map(String::as_str) == Some(id))
        {
            return &mut self.mappings[pos];
        }
        self.mappings.push(Mapping::new(provider, id));
        let last = self.mappings.len() - 1;
        &mut self.mappings[last]
    }

    /// Record (or replace) the provider-local id of a mapping.
    pub fn upsert_provider_id(&mut self, canonical_id: &str, provider: &str, id: &str) {
        if let Some(mapping) = self.mapping_by_canonical_id_mut(canonical_id) {
            mapping
                .by_provider
                .insert(provider.to_string(), id.to_string());
            mapping.updated_at = Utc::now();
        }
    }

    /// Replace the canonical baseline of a mapping.
    pub fn upsert_canonical_snapshot(&mut self, canonical_id: &str, canonical: CanonicalTask) {
        if let Some(mapping) = self.mapping_by_canonical_id_mut(canonical_id) {
            mapping.canonical = Some(canonical.without_id());
            mapping.updated_at = Utc::now();
        }
    }

    pub fn remove_mapping(&mut self, canonical_id: &str) {
        self.mappings.retain(|m| m.canonical_id != canonical_id);
    }

    /// Record a tombstone for `(provider, id)`.
    ///
    /// An existing tombstone for the same pair is refreshed so the newest
    /// delete owns the suppression window.
    pub fn add_tombstone(&mut self, provider: &str, id: &str, deleted_at: DateTime<Utc>) {
        if let Some(existing) = self
            .tombstones
            .iter_mut()
            .find(|t| t.provider == provider && t.id == id)
        {
            if deleted_at > existing.deleted_at {
                existing.deleted_at = deleted_at;
            }
            return;
        }
        self.tombstones.push(Tombstone {
            provider: provider.to_string(),
            id: id.to_string(),
            deleted_at,
        });
    }

    pub fn is_tombstoned(&self, provider: &str, id: &str) -> bool {
        self.tombstones
            .iter()
            .any(|t| t.provider == provider && t.id == id)
    }

    /// Drop tombstones older than `ttl_days`. Returns how many were pruned.
    pub fn prune_expired_tombstones(&mut self, ttl_days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(ttl_days);
        let before = self.tombstones.len();
        self.tombstones.retain(|t| t.deleted_at >= cutoff);
        before - self.tombstones.len()
    }
}
