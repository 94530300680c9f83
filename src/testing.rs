//! In-memory provider for engine tests.
//!
//! Scriptable task inventory with failure injection per stage, used by the
//! integration suites in `tests/`. Not part of the public sync surface.

use crate::provider::{ProviderError, ProviderResult, TaskProvider};
use crate::task::{CanonicalTask, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// A provider backed by an in-memory map.
pub struct MockProvider {
    name: String,
    tasks: Mutex<BTreeMap<String, CanonicalTask>>,
    next_id: AtomicU64,
    fail_list_changes: AtomicBool,
    fail_list_all: AtomicBool,
    fail_writes: AtomicBool,
    deleted_ids: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            fail_list_changes: AtomicBool::new(false),
            fail_list_all: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            deleted_ids: Mutex::new(Vec::new()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CanonicalTask>> {
        self.tasks.lock().expect("mock provider poisoned")
    }

    /// Store a task, assigning an id when it has none. Returns the id.
    pub fn insert(&self, mut task: CanonicalTask) -> String {
        if task.id.is_empty() {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            task.id = format!("{}-{n}", self.name);
        }
        let id = task.id.clone();
        self.locked().insert(id.clone(), task);
        id
    }

    /// Current view of a task, if present.
    pub fn get(&self, id: &str) -> Option<CanonicalTask> {
        self.locked().get(id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.locked().len()
    }

    pub fn live_tasks(&self) -> Vec<CanonicalTask> {
        self.locked()
            .values()
            .filter(|t| t.status != TaskStatus::Deleted)
            .cloned()
            .collect()
    }

    /// Simulate an external deletion: the task vanishes from listings.
    pub fn remove_silently(&self, id: &str) {
        self.locked().remove(id);
    }

    /// Simulate a provider-side delete flag (Google-style): the task stays
    /// listed with `deleted` status and a fresh modification time.
    pub fn mark_deleted(&self, id: &str, at: DateTime<Utc>) {
        if let Some(task) = self.locked().get_mut(id) {
            task.status = TaskStatus::Deleted;
            task.updated_at = at;
        }
    }

    /// Apply an edit to a stored task, stamping the given modification time.
    pub fn edit(&self, id: &str, at: DateTime<Utc>, apply: impl FnOnce(&mut CanonicalTask)) {
        if let Some(task) = self.locked().get_mut(id) {
            apply(task);
            task.updated_at = at;
        }
    }

    pub fn set_fail_list_changes(&self, fail: bool) {
        self.fail_list_changes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list_all(&self, fail: bool) {
        self.fail_list_all.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Ids passed to `delete_task` so far.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted_ids.lock().expect("mock provider poisoned").clone()
    }
}

#[async_trait]
impl TaskProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tasks(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> ProviderResult<Vec<CanonicalTask>> {
        let failing = match since {
            Some(_) => self.fail_list_changes.load(Ordering::SeqCst),
            None => self.fail_list_all.load(Ordering::SeqCst),
        };
        if failing {
            return Err(ProviderError::Http(format!(
                "injected listing failure on {}",
                self.name
            )));
        }

        let tasks = self.locked();
        Ok(tasks
            .values()
            .filter(|t| since.map(|s| t.updated_at >= s).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn upsert_task(&self, input: &CanonicalTask) -> ProviderResult<CanonicalTask> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProviderError::Http(format!(
                "injected write failure on {}",
                self.name
            )));
        }

        let mut stored = input.clone();
        if stored.id.is_empty() {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            stored.id = format!("{}-{n}", self.name);
        }
        stored.updated_at = Utc::now();
        self.locked().insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn delete_task(&self, id: &str) -> ProviderResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProviderError::Http(format!(
                "injected delete failure on {}",
                self.name
            )));
        }
        self.locked().remove(id);
        self.deleted_ids
            .lock()
            .expect("mock provider poisoned")
            .push(id.to_string());
        Ok(())
    }
}
