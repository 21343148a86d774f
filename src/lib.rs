// Tasklist - persisted to-do list over pluggable key-value storage

pub mod codec;
pub mod config;
pub mod confirm;
pub mod filter;
pub mod persist;
pub mod storage;
pub mod store;
pub mod task;

// Re-export main types for convenience
pub use config::Config;
pub use confirm::{ClearCompletedRequest, Confirm, Confirmation};
pub use filter::TaskFilter;
pub use persist::{PersistMode, PersistOptions, PersistStatus};
pub use storage::{Backend, FileStorage, KeyValueStorage, MemoryStorage, SqliteStorage, open_storage};
pub use store::{DEFAULT_STORAGE_KEY, LoadReport, MAX_LIST_KEY_LEN, TaskList, validate_list_key};
pub use task::{Task, TaskId, now_ms};
