// Task list store: in-memory collection synchronized with key-value storage

use crate::codec;
use crate::confirm::{ClearCompletedRequest, Confirm, Confirmation};
use crate::filter::TaskFilter;
use crate::persist::{PersistOptions, PersistStatus, Persister};
use crate::storage::{KeyValueStorage, MAX_KEY_LEN, validate_key};
use crate::task::{IdGenerator, Task, TaskId};
use eyre::{Context, Result, eyre};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key used when none is configured
pub const DEFAULT_STORAGE_KEY: &str = "tasklist:tasks";

const CORRUPT_SUFFIX: &str = ".corrupt";

/// Longest key a task list may use; leaves room for the `.corrupt` backup key
pub const MAX_LIST_KEY_LEN: usize = MAX_KEY_LEN - CORRUPT_SUFFIX.len();

/// Validate a key for a task list
pub fn validate_list_key(key: &str) -> Result<()> {
    validate_key(key)?;
    if key.len() > MAX_LIST_KEY_LEN {
        return Err(eyre!(
            "Task list key too long: {} chars (max {})",
            key.len(),
            MAX_LIST_KEY_LEN
        ));
    }
    Ok(())
}

/// What `load` found in storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// An entry existed under the key
    pub found: bool,
    pub loaded: usize,
    /// Malformed, blank or duplicate elements dropped while decoding
    pub skipped: usize,
    /// The stored value was unreadable and has been moved to
    /// `<key>.corrupt`; the list started empty
    pub recovered_corrupt: bool,
}

/// Ordered, persisted collection of tasks
///
/// The store is the only way to change the collection. Every mutation that
/// changes `tasks` hands a snapshot of the whole list to the persister.
pub struct TaskList {
    key: String,
    storage: Arc<dyn KeyValueStorage>,
    persister: Persister,
    tasks: Vec<Task>,
    filter: TaskFilter,
    draft: String,
    ids: IdGenerator,
    last_load: LoadReport,
}

impl TaskList {
    /// Open the list stored under `key`, loading it before returning
    pub fn open(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>, options: &PersistOptions) -> Result<Self> {
        let key = key.into();
        validate_list_key(&key)?;

        let persister = Persister::new(Arc::clone(&storage), key.clone(), options)?;
        let mut list = Self {
            key,
            storage,
            persister,
            tasks: Vec::new(),
            filter: TaskFilter::default(),
            draft: String::new(),
            ids: IdGenerator::new(),
            last_load: LoadReport::default(),
        };

        list.load()?;
        Ok(list)
    }

    /// Replace the in-memory collection with what storage holds
    ///
    /// A missing entry leaves the list empty. A value that is not a task
    /// array is copied to `<key>.corrupt` and the list starts empty;
    /// individual bad elements are dropped.
    pub fn load(&mut self) -> Result<LoadReport> {
        // Pending writes must land before reading back
        self.persister.flush();

        let raw = self
            .storage
            .get(&self.key)
            .with_context(|| format!("Failed to read task list from {} storage", self.storage.name()))?;

        let mut report = LoadReport::default();
        let tasks = match raw {
            None => {
                debug!(key = %self.key, "No stored task list, starting empty");
                Vec::new()
            }
            Some(raw) => {
                report.found = true;
                match codec::decode(&raw) {
                    Ok(decoded) => {
                        report.skipped = decoded.skipped;
                        decoded.tasks
                    }
                    Err(e) => {
                        let backup_key = format!("{}{}", self.key, CORRUPT_SUFFIX);
                        warn!(
                            key = %self.key,
                            backup_key = %backup_key,
                            error = %format!("{:#}", e),
                            "Stored task list is corrupt, starting empty"
                        );
                        self.storage
                            .set(&backup_key, &raw)
                            .context("Failed to back up corrupt task list")?;
                        report.recovered_corrupt = true;
                        Vec::new()
                    }
                }
            }
        };

        for task in &tasks {
            self.ids.observe(task.id);
        }
        report.loaded = tasks.len();
        self.tasks = tasks;

        info!(
            key = %self.key,
            count = report.loaded,
            skipped = report.skipped,
            "Loaded task list"
        );

        self.last_load = report.clone();
        Ok(report)
    }

    /// Serialize the whole collection and hand it to the persister.
    /// Returns the snapshot's generation.
    pub fn persist(&mut self) -> Result<u64> {
        let payload = codec::encode(&self.tasks)?;
        Ok(self.persister.submit(payload))
    }

    fn changed(&mut self) {
        if let Err(e) = self.persist() {
            warn!(key = %self.key, error = %format!("{:#}", e), "Failed to snapshot task list");
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a task. Returns `None` without changing anything when `text`
    /// is empty after trimming, or when the list already holds the largest
    /// possible id.
    pub fn add(&mut self, text: &str) -> Option<TaskId> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty task text");
            return None;
        }

        let Some(id) = self.ids.next_id() else {
            warn!(key = %self.key, "No task ids left, not adding task");
            return None;
        };
        self.tasks.push(Task::new(id, text));
        debug!(id, "Added task");
        self.changed();
        Some(id)
    }

    /// Flip `completed` on the task with `id`. Returns whether a task matched.
    pub fn toggle(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            debug!(id, "Toggle: no such task");
            return false;
        };
        task.toggle();
        debug!(id, completed = task.completed, "Toggled task");
        self.changed();
        true
    }

    /// Remove the task with `id`. Returns whether a task matched.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let Some(index) = self.tasks.iter().position(|t| t.id == id) else {
            debug!(id, "Remove: no such task");
            return false;
        };
        self.tasks.remove(index);
        debug!(id, "Removed task");
        self.changed();
        true
    }

    /// First step of clearing completed tasks: `None` if there is nothing to
    /// clear, otherwise a request to put in front of the user
    pub fn request_clear_completed(&self) -> Option<ClearCompletedRequest> {
        let count = self.completed_count();
        (count > 0).then(|| ClearCompletedRequest::new(count))
    }

    /// Second step: apply the user's answer. Returns how many tasks were
    /// removed; cancelling removes none.
    pub fn resolve_clear_completed(&mut self, request: ClearCompletedRequest, answer: Confirmation) -> usize {
        if answer == Confirmation::Cancelled {
            debug!(requested = request.count(), "Clear completed cancelled");
            return 0;
        }

        let before = self.tasks.len();
        self.tasks.retain(|t| !t.completed);
        let removed = before - self.tasks.len();
        debug!(requested = request.count(), removed, "Cleared completed tasks");
        if removed > 0 {
            self.changed();
        }
        removed
    }

    /// Run both steps of clearing completed tasks through `confirmer`.
    /// The confirmer is not consulted when nothing is completed.
    pub fn clear_completed_with<C: Confirm + ?Sized>(&mut self, confirmer: &mut C) -> Result<usize> {
        let Some(request) = self.request_clear_completed() else {
            return Ok(0);
        };
        let answer = confirmer.confirm(&request)?;
        Ok(self.resolve_clear_completed(request, answer))
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    // ========================================================================
    // Pending input
    // ========================================================================

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Add the draft as a task; the draft is cleared only if that succeeded
    pub fn submit_draft(&mut self) -> Option<TaskId> {
        let draft = std::mem::take(&mut self.draft);
        let id = self.add(&draft);
        if id.is_none() {
            self.draft = draft;
        }
        id
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn filter(&self) -> TaskFilter {
        self.filter
    }

    /// Tasks matching the active filter, in list order
    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| self.filter.matches(t)).collect()
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.len() - self.completed_count()
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Report from the most recent `load`
    pub fn last_load(&self) -> &LoadReport {
        &self.last_load
    }

    pub fn persist_status(&self) -> PersistStatus {
        self.persister.status()
    }

    /// Wait for queued snapshot writes to be attempted
    pub fn flush(&self) -> PersistStatus {
        self.persister.flush();
        self.persister.status()
    }
}
