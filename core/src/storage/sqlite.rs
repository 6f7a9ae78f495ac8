//! SQLite-backed ordered key-value store.
//!
//! Keys live in a `WITHOUT ROWID` table, so rows are kept in key order by the
//! primary-key B-tree. Commits run with `synchronous = FULL` on a WAL journal:
//! a returned [`KvStore::write`] has reached stable storage.

use super::{BatchOp, KvStore, Result, StorageError, WriteBatch};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::info;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID;";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens or creates the store at `path`, creating parent directories.
    /// `cache_kib` sizes SQLite's page cache.
    pub fn open(path: impl AsRef<Path>, cache_kib: u32) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // journal_mode reports the resulting mode as a row.
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(&format!(
            "PRAGMA synchronous = FULL; PRAGMA cache_size = -{cache_kib};"
        ))?;
        conn.execute_batch(SCHEMA_SQL)?;

        info!(
            "Opened message store {} (journal={}, cache={} KiB)",
            path.display(),
            mode,
            cache_kib
        );

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        let mut conn = self.conn.lock();
        // Dropping the transaction on an early return rolls it back.
        let tx = conn.transaction()?;

        for op in batch.ops() {
            match op {
                BatchOp::Insert { key, value } => {
                    tx.execute(
                        "INSERT INTO kv (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )
                    .map_err(|e| match e.sqlite_error_code() {
                        Some(ErrorCode::ConstraintViolation) => {
                            StorageError::KeyExists(key.clone())
                        }
                        _ => StorageError::Sqlite(e),
                    })?;
                }
                BatchOp::Put { key, value } => {
                    tx.execute(
                        "INSERT INTO kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}
