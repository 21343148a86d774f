// View filters for the task list

use crate::task::Task;
use eyre::eyre;
use std::str::FromStr;

/// Which tasks a view shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TaskFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl TaskFilter {
    pub const VARIANTS: [TaskFilter; 3] = [TaskFilter::All, TaskFilter::Pending, TaskFilter::Completed];

    /// Whether `task` belongs in a view using this filter
    pub fn matches(self, task: &Task) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Pending => !task.completed,
            TaskFilter::Completed => task.completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskFilter::All => "all",
            TaskFilter::Pending => "pending",
            TaskFilter::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskFilter {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskFilter::VARIANTS
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| eyre!("Unknown filter: {} (expected all, pending or completed)", s))
    }
}
