//! `json_file` backend: one JSON document per key.
//!
//! Layout:
//!
//! ```text
//! {work_dir}/store/
//! ├── keyword_responses.json
//! ├── responses.json
//! ├── qa_pairs.json
//! └── bot_state.json
//! ```
//!
//! Writes go to `<key>.json.tmp` first and are renamed into place, so a
//! crash mid-write never leaves a truncated document behind.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::StoreError;
use super::super::store::KvBackend;
use super::legacy::{file_stem, read_optional, LegacyFiles};

const BACKEND: &str = "json_file";

pub struct JsonFileStore {
    dir: PathBuf,
    legacy: Option<LegacyFiles>,
}

impl JsonFileStore {
    /// Open (creating if needed) the store directory.
    pub fn open(dir: impl Into<PathBuf>, legacy: Option<LegacyFiles>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::backend(BACKEND, "*", format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir, legacy })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

impl KvBackend for JsonFileStore {
    fn backend_type(&self) -> &str {
        BACKEND
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        read_optional(&self.path(key)).map_err(|e| StoreError::backend(BACKEND, key, e))
    }

    fn get_compat(&self, key: &str) -> Result<Option<String>, StoreError> {
        match &self.legacy {
            Some(legacy) => legacy.read(BACKEND, key),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| {
            StoreError::backend(BACKEND, key, format!("cannot write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &path).map_err(|e| {
            StoreError::backend(BACKEND, key, format!("cannot replace {}: {e}", path.display()))
        })
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::backend(
                BACKEND,
                key,
                format!("cannot remove {}: {e}", path.display()),
            )),
        }
    }
}
