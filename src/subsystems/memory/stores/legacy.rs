//! Read-only access to legacy flat `<key>.json` files.
//!
//! Earlier deployments kept `keyword_responses.json`, `responses.json` and
//! `qa_pairs.json` next to the process.  Backends use this as their
//! compatibility retrieval path.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct LegacyFiles {
    dir: PathBuf,
}

impl LegacyFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn read(&self, backend: &str, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.dir.join(format!("{}.json", file_stem(key)));
        read_optional(&path).map_err(|e| StoreError::backend(backend, key, e))
    }
}

/// Map a store key onto a safe file stem: anything outside
/// `[A-Za-z0-9_-]` becomes `_`.
pub(crate) fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// `Ok(None)` when the file does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, String> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("cannot read {}: {e}", path.display())),
    }
}
