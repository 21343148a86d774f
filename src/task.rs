// Task record and id generation

use serde::{Deserialize, Serialize};

/// Task identifier: a millisecond timestamp taken at creation time
pub type TaskId = i64;

/// A single to-do entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
}

impl Task {
    /// Create a pending task. Callers are responsible for trimming `text`.
    pub fn new(id: TaskId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
        }
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// Hands out strictly increasing ids based on the wall clock
///
/// Two tasks added within the same millisecond, or a clock that moved
/// backwards, still get distinct ids: the generator falls back to
/// `last + 1` whenever the clock has not passed the last id it saw. Once
/// `i64::MAX` has been seen there is no larger id left to hand out.
#[derive(Debug, Default, Clone)]
pub struct IdGenerator {
    last: TaskId,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id that already exists (e.g. loaded from storage)
    pub fn observe(&mut self, id: TaskId) {
        if id > self.last {
            self.last = id;
        }
    }

    /// Next id, or `None` when ids are exhausted
    pub fn next_id(&mut self) -> Option<TaskId> {
        self.next_at(now_ms())
    }

    pub(crate) fn next_at(&mut self, now: TaskId) -> Option<TaskId> {
        let id = if now > self.last { now } else { self.last.checked_add(1)? };
        self.last = id;
        Some(id)
    }
}

// Helper function for timestamps
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
