//! Memory subsystem: the self-healing persistent store.
//!
//! [`PersistentStore`] wraps a pluggable [`KvBackend`] and gives the rest of
//! the crate three guarantees:
//!
//! * every call runs on the blocking pool and is bounded by a timeout;
//! * [`get`](PersistentStore::get) tries the primary path, then the
//!   compatibility path when the primary is empty, and never raises;
//! * [`load_or_init`](PersistentStore::load_or_init) always yields a valid
//!   decoded value: absent keys are written with their default first,
//!   undecodable ones are [`repair`](PersistentStore::repair)ed.

pub mod store;
pub mod stores;

pub use store::KvBackend;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{AppError, StoreError};
use stores::legacy::LegacyFiles;

/// Shared handle to the persistent store.  Cheap to clone.
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KvBackend>,
    timeout: Duration,
}

impl PersistentStore {
    pub fn new(backend: Arc<dyn KvBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// In-memory store, for tests and dry runs.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(stores::tmp::TmpStore::new()), Duration::from_secs(3))
    }

    /// Open the configured backend under `work_dir`.
    pub fn open(config: &StoreConfig, work_dir: &Path) -> Result<Self, AppError> {
        let legacy = config.legacy_dir.as_deref().map(LegacyFiles::new);
        let backend: Arc<dyn KvBackend> = match config.backend {
            StoreBackend::Tmp => Arc::new(stores::tmp::TmpStore::new()),
            StoreBackend::JsonFile => {
                Arc::new(stores::json_file::JsonFileStore::open(work_dir.join("store"), legacy)?)
            }
            #[cfg(feature = "store-sqlite")]
            StoreBackend::Sqlite => {
                std::fs::create_dir_all(work_dir)?;
                Arc::new(stores::sqlite::SqliteStore::open(&work_dir.join("store.db"), legacy)?)
            }
            #[cfg(not(feature = "store-sqlite"))]
            StoreBackend::Sqlite => {
                return Err(AppError::Config(
                    "store backend 'sqlite' requires the `store-sqlite` feature".into(),
                ));
            }
        };
        info!(backend = backend.backend_type(), "persistent store ready");
        Ok(Self::new(backend, config.timeout))
    }

    pub fn backend_type(&self) -> &str {
        self.backend.backend_type()
    }

    /// Run one backend operation on the blocking pool, bounded by the timeout.
    async fn blocking<T, F>(&self, op: &'static str, key: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn KvBackend) -> Result<T, StoreError> + Send + 'static,
    {
        let backend = self.backend.clone();
        let task = tokio::task::spawn_blocking(move || f(backend.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(StoreError::Join(format!("{op} join: {e}"))),
            Err(_) => Err(StoreError::Timeout {
                op,
                key: key.to_string(),
                ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Primary path, then compatibility path.  The compatibility path is
    /// only consulted when the primary read comes back empty; a primary
    /// failure is returned as-is.
    async fn fetch(&self, key: &str) -> Result<Option<String>, StoreError> {
        let owned = key.to_string();
        if let Some(value) = self.blocking("get", key, move |b| b.get(&owned)).await? {
            return Ok(Some(value));
        }

        let owned = key.to_string();
        let compat = self.blocking("get_compat", key, move |b| b.get_compat(&owned)).await?;
        if compat.is_some() {
            debug!(key, "value served from compatibility path");
        }
        Ok(compat)
    }

    /// Raw read.  Never fails: errors are logged and degrade to `None`.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.fetch(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "store read failed: {e}");
                None
            }
        }
    }

    /// Overwrite the full value for `key`.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let (k, v) = (key.to_string(), value.to_string());
        self.blocking("set", key, move |b| b.set(&k, &v)).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let k = key.to_string();
        self.blocking("delete", key, move |b| b.delete(&k)).await
    }

    /// Encode `value` as JSON and overwrite `key`.
    pub async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(value).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set(key, &encoded).await
    }

    /// Drop a corrupt value and rewrite `default` so the next read succeeds.
    pub async fn repair<T: Serialize>(&self, key: &str, default: &T) -> Result<(), StoreError> {
        if let Err(e) = self.delete(key).await {
            // Still attempt the overwrite; `set` replaces the value anyway.
            warn!(key, "delete during repair failed: {e}");
        }
        self.save(key, default).await?;
        info!(key, "store key repaired to default");
        Ok(())
    }

    /// Read and decode `key` for a read-modify-write.
    ///
    /// Absent and undecodable values are handled as in
    /// [`load_or_init`](Self::load_or_init), but a backend failure is
    /// returned so the caller does not overwrite data it never saw.
    pub async fn load<T, F>(&self, key: &str, default: F) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> T,
    {
        match self.fetch(key).await? {
            Some(raw) => match decode::<T>(key, &raw) {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!(key, "{e}; repairing");
                    let value = default();
                    if let Err(e) = self.repair(key, &value).await {
                        warn!(key, "repair failed: {e}");
                    }
                    Ok(value)
                }
            },
            None => {
                let value = default();
                match self.save(key, &value).await {
                    Ok(()) => debug!(key, "initialised absent key with default"),
                    Err(e) => warn!(key, "cannot initialise absent key: {e}"),
                }
                Ok(value)
            }
        }
    }

    /// Read and decode `key`, falling back to `default()`.
    ///
    /// * absent → `default()` is written, then returned;
    /// * undecodable → repaired to `default()`, which is returned;
    /// * backend failure → `default()` is returned and nothing is written,
    ///   so a transient outage cannot wipe stored data.
    pub async fn load_or_init<T, F>(&self, key: &str, default: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> T,
    {
        match self.load(key, &default).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "store read failed, using default: {e}");
                default()
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
