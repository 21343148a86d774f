// Best-effort durability for task list snapshots
//
// Every mutation hands the persister a full serialized snapshot. Writes
// never block or fail the caller: failures are logged and recorded in
// `PersistStatus` and the next snapshot simply tries again.

use crate::storage::KeyValueStorage;
use eyre::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Where snapshot writes run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Write on the caller's thread before the mutation returns
    Immediate,
    /// Hand snapshots to a dedicated writer thread
    #[default]
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistOptions {
    pub mode: PersistMode,
    /// How long the writer holds a snapshot before writing it; newer
    /// snapshots arriving inside the window replace the pending one without
    /// extending it. Background mode only.
    pub debounce_ms: u64,
}

/// Progress and health of snapshot writes
///
/// Snapshots are numbered by generation starting at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStatus {
    /// Last generation handed to the persister
    pub submitted: u64,
    /// Last generation a write was attempted for (superseded ones included)
    pub attempted: u64,
    /// Last generation durably written
    pub written: u64,
    pub writes: u64,
    pub failures: u64,
    /// Snapshots dropped because a newer one replaced them before writing
    pub coalesced: u64,
    /// Error of the most recent attempt; cleared by the next successful write
    pub last_error: Option<String>,
}

impl PersistStatus {
    /// Every submitted snapshot has been attempted
    pub fn is_idle(&self) -> bool {
        self.attempted >= self.submitted
    }

    /// Storage holds the newest submitted snapshot
    pub fn is_synced(&self) -> bool {
        self.written >= self.submitted
    }
}

struct Snapshot {
    generation: u64,
    payload: String,
}

enum Message {
    Write(Snapshot),
    Flush(Sender<()>),
}

struct Worker {
    tx: Sender<Message>,
    handle: JoinHandle<()>,
}

/// Writes snapshots of one storage key
pub struct Persister {
    key: String,
    storage: Arc<dyn KeyValueStorage>,
    status: Arc<Mutex<PersistStatus>>,
    worker: Option<Worker>,
}

impl Persister {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>, options: &PersistOptions) -> Result<Self> {
        let key = key.into();
        let status = Arc::new(Mutex::new(PersistStatus::default()));

        let worker = match options.mode {
            PersistMode::Immediate => None,
            PersistMode::Background => {
                let (tx, rx) = mpsc::channel();
                let writer = Writer {
                    key: key.clone(),
                    storage: Arc::clone(&storage),
                    status: Arc::clone(&status),
                    debounce: Duration::from_millis(options.debounce_ms),
                };
                let handle = thread::Builder::new()
                    .name("tasklist-writer".to_string())
                    .spawn(move || writer.run(rx))
                    .context("Failed to spawn writer thread")?;
                Some(Worker { tx, handle })
            }
        };

        debug!(key = %key, storage = storage.name(), mode = ?options.mode, "Persister ready");

        Ok(Self {
            key,
            storage,
            status,
            worker,
        })
    }

    /// Queue (or, in immediate mode, perform) a write of `payload`.
    /// Returns the snapshot's generation.
    pub fn submit(&self, payload: String) -> u64 {
        let generation = {
            let mut status = self.status.lock();
            status.submitted += 1;
            status.submitted
        };
        let snapshot = Snapshot { generation, payload };

        match &self.worker {
            None => write_snapshot(self.storage.as_ref(), &self.key, &self.status, snapshot),
            Some(worker) => {
                if worker.tx.send(Message::Write(snapshot)).is_err() {
                    let mut status = self.status.lock();
                    status.attempted = status.attempted.max(generation);
                    status.failures += 1;
                    status.last_error = Some("Writer thread is not running".to_string());
                    warn!(key = %self.key, generation, "Writer thread is not running, snapshot dropped");
                }
            }
        }

        generation
    }

    /// Block until every snapshot submitted so far has been attempted
    pub fn flush(&self) {
        if let Some(worker) = &self.worker {
            let (ack_tx, ack_rx) = mpsc::channel();
            if worker.tx.send(Message::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
    }

    pub fn status(&self) -> PersistStatus {
        self.status.lock().clone()
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Closing the channel makes the writer drain what it holds and exit
            drop(worker.tx);
            if worker.handle.join().is_err() {
                warn!(key = %self.key, "Writer thread panicked");
            }
        }
    }
}

struct Writer {
    key: String,
    storage: Arc<dyn KeyValueStorage>,
    status: Arc<Mutex<PersistStatus>>,
    debounce: Duration,
}

impl Writer {
    fn run(self, rx: Receiver<Message>) {
        let mut pending: Option<Snapshot> = None;
        // When the oldest unwritten snapshot arrived; bounds the debounce
        // window so a steady stream of snapshots still gets written
        let mut pending_since = Instant::now();

        loop {
            let message = if pending.is_none() {
                match rx.recv() {
                    Ok(m) => m,
                    Err(_) => return,
                }
            } else if self.debounce.is_zero() {
                match rx.try_recv() {
                    Ok(m) => m,
                    Err(TryRecvError::Empty) => {
                        self.write_pending(&mut pending);
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => {
                        self.write_pending(&mut pending);
                        return;
                    }
                }
            } else {
                let wait = self.debounce.saturating_sub(pending_since.elapsed());
                if wait.is_zero() {
                    self.write_pending(&mut pending);
                    continue;
                }
                match rx.recv_timeout(wait) {
                    Ok(m) => m,
                    Err(RecvTimeoutError::Timeout) => {
                        self.write_pending(&mut pending);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        self.write_pending(&mut pending);
                        return;
                    }
                }
            };

            match message {
                Message::Write(snapshot) => {
                    if pending.is_none() {
                        pending_since = Instant::now();
                    }
                    if let Some(old) = pending.replace(snapshot) {
                        let mut status = self.status.lock();
                        status.coalesced += 1;
                        status.attempted = status.attempted.max(old.generation);
                    }
                }
                Message::Flush(ack) => {
                    self.write_pending(&mut pending);
                    let _ = ack.send(());
                }
            }
        }
    }

    fn write_pending(&self, pending: &mut Option<Snapshot>) {
        if let Some(snapshot) = pending.take() {
            write_snapshot(self.storage.as_ref(), &self.key, &self.status, snapshot);
        }
    }
}

fn write_snapshot(storage: &dyn KeyValueStorage, key: &str, status: &Mutex<PersistStatus>, snapshot: Snapshot) {
    let result = storage.set(key, &snapshot.payload);

    let mut status = status.lock();
    status.attempted = status.attempted.max(snapshot.generation);
    match result {
        Ok(()) => {
            status.writes += 1;
            status.written = status.written.max(snapshot.generation);
            status.last_error = None;
            debug!(
                key,
                storage = storage.name(),
                generation = snapshot.generation,
                bytes = snapshot.payload.len(),
                "Persisted task list"
            );
        }
        Err(e) => {
            let message = format!("{:#}", e);
            status.failures += 1;
            warn!(
                key,
                storage = storage.name(),
                generation = snapshot.generation,
                error = %message,
                "Failed to persist task list"
            );
            status.last_error = Some(message);
        }
    }
}
