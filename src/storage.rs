// Key-value storage backends for persisted task lists

use crate::task::now_ms;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub(crate) const MAX_KEY_LEN: usize = 128;
const SQLITE_FILE: &str = "tasklist.db";

/// Durable string-to-string storage
///
/// Implementations must be safe to share with the background writer thread.
/// A `set` either replaces the whole value or fails; readers never observe a
/// partially written value.
pub trait KeyValueStorage: Send + Sync {
    /// Short backend name used in log fields
    fn name(&self) -> &'static str;

    /// Read the value stored under `key`, `None` if there is no entry
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Which storage backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    File,
    Sqlite,
    /// Nothing outlives the process; not offered on the command line
    #[value(skip)]
    Memory,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::File => write!(f, "file"),
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

/// Open the configured backend rooted at `data_dir`
pub fn open_storage(backend: Backend, data_dir: &Path) -> Result<Arc<dyn KeyValueStorage>> {
    debug!(%backend, data_dir = ?data_dir, "Opening storage");
    let storage: Arc<dyn KeyValueStorage> = match backend {
        Backend::File => Arc::new(FileStorage::open(data_dir)?),
        Backend::Sqlite => Arc::new(SqliteStorage::open(data_dir.join(SQLITE_FILE))?),
        Backend::Memory => Arc::new(MemoryStorage::new()),
    };
    Ok(storage)
}

/// Validate a storage key
pub fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(eyre!("Storage key cannot be empty or whitespace-only"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(eyre!("Storage key too long: {} chars (max {})", key.len(), MAX_KEY_LEN));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | ':'))
    {
        return Err(eyre!(
            "Invalid storage key: {} (must be alphanumeric with _-.@:)",
            key
        ));
    }
    Ok(())
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    fail_writes: bool,
    writes: usize,
}

/// Process-local storage; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set` fail until switched off again
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }
}

impl KeyValueStorage for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(eyre!("Memory storage is refusing writes"));
        }
        inner.entries.insert(key.to_string(), value.to_string());
        inner.writes += 1;
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

/// One file per key under a directory
///
/// Writers hold an exclusive lock on `<dir>/.lock`, write to a temp file,
/// fsync it and rename it over the target, so a crash mid-write leaves the
/// previous value intact.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open or create a file store in `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("Failed to create storage directory")?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the value for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_name(key)))
    }

    fn lock_file(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.dir.join(".lock"))
            .context("Failed to open storage lock file")
    }
}

impl KeyValueStorage for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);

        let lock = self.lock_file()?;
        FileExt::lock_shared(&lock).context("Failed to acquire shared storage lock")?;

        if !path.exists() {
            return Ok(None);
        }

        let value = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        // Acquire exclusive lock before writing
        let lock = self.lock_file()?;
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        {
            let mut file = File::create(&tmp_path).context("Failed to create temp file")?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path).with_context(|| format!("Failed to move value into {}", path.display()))?;

        debug!(key, file = ?path, bytes = value.len(), "Wrote value");

        // Lock is automatically released when file is dropped
        Ok(())
    }
}

/// Map a key to a portable file name; anything outside `[A-Za-z0-9_.-]`
/// becomes `%XX`
fn encode_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for c in key.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
            name.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                name.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    name
}

// ============================================================================
// SQLite backend
// ============================================================================

/// Key-value table in a SQLite database
pub struct SqliteStorage {
    db: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create storage directory")?;
        }
        let db = Connection::open(path).context("Failed to open SQLite database")?;
        Self::with_connection(db)
    }

    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(db)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        debug!("Creating database schema");
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { db: Mutex::new(db) })
    }
}

impl KeyValueStorage for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock();
        let value = db
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![key, value, now_ms()],
        )
        .context("Failed to write value")?;
        Ok(())
    }
}
