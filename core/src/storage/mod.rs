//! # stompmq Storage Module
//!
//! Durable append log for point-to-point destinations, layered on an embedded
//! ordered key-value store.
//!
//! ## Key layout
//!
//! | key                     | value                                   |
//! |-------------------------|-----------------------------------------|
//! | `<destination>.<seq>`   | raw message body, written exactly once  |
//! | `<destination>.write`   | latest write sequence as decimal text   |
//!
//! Both keys of an append are committed in one atomic [`WriteBatch`], so the
//! marker never runs ahead of or behind the messages after a successful write.
//! Sequence numbers start at 1 for a fresh destination.
//!
//! ## Backends
//!
//! - [`sqlite`] - file-backed store with synchronous commits, used in
//!   production
//! - [`memory`] - ordered in-memory map, used when no database file is
//!   configured and in tests
//!
//! ## Concurrency
//!
//! Sequence allocation is not atomic. The broker processes one request at a
//! time and [`MessageLog::append`] takes the destination's counters by
//! `&mut`, so the borrow checker enforces a single writer per destination.
//! Moving to several workers would need per-destination serialization first.

pub mod memory;
pub mod sqlite;
pub mod tests;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

/// Upper bound for any composed key.
pub const MAX_KEY_LEN: usize = 256;
/// Room kept for the separator plus the widest `u64` suffix.
pub const KEY_SUFFIX_RESERVE: usize = 1 + 20;
/// Longest destination name whose keys still fit in [`MAX_KEY_LEN`].
pub const MAX_DESTINATION_LEN: usize = MAX_KEY_LEN - KEY_SUFFIX_RESERVE;

const KEY_SEPARATOR: char = '.';
const WRITE_MARKER: &str = "write";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("key of {len} bytes exceeds the {max} byte limit")]
    KeyTooLong { len: usize, max: usize },

    #[error("corrupt sequence marker {key}: {value:?}")]
    CorruptMarker { key: String, value: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Write a key that must not exist yet.
    Insert { key: String, value: Vec<u8> },
    /// Write a key, replacing any previous value.
    Put { key: String, value: Vec<u8> },
}

/// A group of writes applied all-or-nothing by [`KvStore::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Insert {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Contract of the embedded store: ordered string keys, point reads and
/// atomic batched writes that are durable once `write` returns.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn write(&self, batch: WriteBatch) -> Result<()>;
}

pub fn message_key(destination: &str, seq: u64) -> String {
    format!("{destination}{KEY_SEPARATOR}{seq}")
}

pub fn write_marker_key(destination: &str) -> String {
    format!("{destination}{KEY_SEPARATOR}{WRITE_MARKER}")
}

/// Per-destination sequence counters.
///
/// `write` is the last sequence number handed out. `read` is restored with
/// the destination but not advanced, since persisted messages are not
/// replayed to subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCounters {
    pub read: u64,
    pub write: u64,
}

/// The persistence adapter used by the destination registry.
#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for MessageLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageLog").finish_non_exhaustive()
    }
}

impl MessageLog {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Log backed by a fresh [`MemoryStore`]; nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Opens (creating if needed) a [`SqliteStore`] at `path`.
    pub fn open(path: impl AsRef<Path>, cache_kib: u32) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open(path, cache_kib)?)))
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Restores the counters of `destination`. A missing marker means a new
    /// destination and yields zeroed counters; only store errors fail.
    pub fn load(&self, destination: &str) -> Result<SequenceCounters> {
        let key = write_marker_key(destination);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(SequenceCounters::default());
        };

        let value = String::from_utf8_lossy(&raw).into_owned();
        let write = value
            .trim()
            .parse::<u64>()
            .map_err(|_| StorageError::CorruptMarker {
                key: key.clone(),
                value: value.clone(),
            })?;

        debug!("Restored {} at write sequence {}", destination, write);
        Ok(SequenceCounters { read: 0, write })
    }

    /// Appends `payload` under the next sequence number of `destination` and
    /// returns that number. The counters only advance once the batch has been
    /// committed, so a failed append leaves no gap.
    pub fn append(
        &self,
        destination: &str,
        counters: &mut SequenceCounters,
        payload: &[u8],
    ) -> Result<u64> {
        let seq = counters.write + 1;
        let key = message_key(destination, seq);
        if key.len() > MAX_KEY_LEN {
            return Err(StorageError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }

        let mut batch = WriteBatch::new();
        batch
            .insert(key, payload)
            .put(write_marker_key(destination), seq.to_string());

        if let Err(e) = self.store.write(batch) {
            error!("Append to {} failed: {}", destination, e);
            return Err(e);
        }

        counters.write = seq;
        Ok(seq)
    }
}
