//! SQLite-backed [`KeyValueStore`].
//!
//! One table, `kv`, holding string keys and values. The connection sits behind
//! a mutex so the store can be shared through an `Arc` like every other
//! storage backend.

use crate::storage::KeyValueStore;
use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store database at {}", path.display()))?;
        debug!("Opened store database at {}", path.display());
        Self::init(conn)
    }

    /// Store that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create kv table")?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection lock poisoned"))?;
        f(&conn)
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
                .context("Failed to count kv entries")?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
                .optional()
                .with_context(|| format!("Failed to read `{key}`"))
        })
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        trace!("Writing `{key}` ({} bytes)", value.len());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                (key, value),
            )
            .with_context(|| format!("Failed to write `{key}`"))?;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [key])
                .with_context(|| format!("Failed to delete `{key}`"))?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM kv", []).context("Failed to clear kv table")?;
            Ok(())
        })
    }
}
