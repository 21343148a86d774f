// Confirmation step for destructive bulk actions

use eyre::Result;

/// The user's answer to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Cancelled,
}

/// Pending request to clear completed tasks
///
/// Only `TaskList::request_clear_completed` creates one, and only when there
/// is something to clear. It carries what a dialog needs to ask the question;
/// handing it back to `TaskList::resolve_clear_completed` applies the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearCompletedRequest {
    count: usize,
}

impl ClearCompletedRequest {
    pub(crate) fn new(count: usize) -> Self {
        Self { count }
    }

    /// Completed tasks at the time of the request
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn title(&self) -> &'static str {
        "Clear completed"
    }

    pub fn message(&self) -> String {
        match self.count {
            1 => "Remove 1 completed task?".to_string(),
            n => format!("Remove {} completed tasks?", n),
        }
    }

    pub fn cancel_label(&self) -> &'static str {
        "Cancel"
    }

    pub fn confirm_label(&self) -> &'static str {
        "Clear"
    }
}

/// Something that can answer a confirmation prompt (a dialog, a terminal
/// prompt, a fixed answer)
pub trait Confirm {
    fn confirm(&mut self, request: &ClearCompletedRequest) -> Result<Confirmation>;
}

/// A fixed answer, e.g. for `--yes` or tests
impl Confirm for Confirmation {
    fn confirm(&mut self, _request: &ClearCompletedRequest) -> Result<Confirmation> {
        Ok(*self)
    }
}
