//! `sqlite` backend: a single `kv` table in `{work_dir}/store.db`.
//!
//! ```sql
//! CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at INTEGER NOT NULL)
//! ```
//!
//! The connection is guarded by a mutex; the caller already runs every
//! operation on the blocking pool.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use super::super::store::KvBackend;
use super::legacy::LegacyFiles;

const BACKEND: &str = "sqlite";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    legacy: Option<LegacyFiles>,
}

impl SqliteStore {
    pub fn open(path: &Path, legacy: Option<LegacyFiles>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::backend(BACKEND, "*", format!("cannot open {}: {e}", path.display()))
        })?;
        Self::init(conn, legacy)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::backend(BACKEND, "*", e))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, legacy: Option<LegacyFiles>) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 updated_at INTEGER NOT NULL
             );",
        )
        .map_err(|e| StoreError::backend(BACKEND, "*", format!("schema init: {e}")))?;
        Ok(Self { conn: Mutex::new(conn), legacy })
    }

    fn conn(&self, key: &str) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::backend(BACKEND, key, "connection lock poisoned"))
    }
}

impl KvBackend for SqliteStore {
    fn backend_type(&self) -> &str {
        BACKEND
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.conn(key)?
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| StoreError::backend(BACKEND, key, e))
    }

    fn get_compat(&self, key: &str) -> Result<Option<String>, StoreError> {
        match &self.legacy {
            Some(legacy) => legacy.read(BACKEND, key),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn(key)?
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map(|_| ())
            .map_err(|e| StoreError::backend(BACKEND, key, e))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.conn(key)?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map(|n| n > 0)
            .map_err(|e| StoreError::backend(BACKEND, key, e))
    }
}
