//! `tmp` backend: ephemeral in-memory key-value store.
//!
//! All data lives in process memory and is discarded when the process exits.
//! Used by tests and by `backend = "tmp"` dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StoreError;
use super::super::store::KvBackend;

/// Ephemeral in-memory key-value store.
#[derive(Default)]
pub struct TmpStore {
    data: Mutex<HashMap<String, String>>,
}

impl TmpStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned(key: &str) -> StoreError {
        StoreError::backend("tmp", key, "lock poisoned")
    }
}

impl KvBackend for TmpStore {
    fn backend_type(&self) -> &str {
        "tmp"
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().map_err(|_| Self::poisoned(key))?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| Self::poisoned(key))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut data = self.data.lock().map_err(|_| Self::poisoned(key))?;
        Ok(data.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = TmpStore::new();

        assert_eq!(store.get("foo").unwrap(), None);

        store.set("foo", "bar").unwrap();
        assert_eq!(store.get("foo").unwrap(), Some("bar".into()));

        store.set("foo", "baz").unwrap();
        assert_eq!(store.get("foo").unwrap(), Some("baz".into()));

        assert!(store.delete("foo").unwrap());
        assert_eq!(store.get("foo").unwrap(), None);
        assert!(!store.delete("foo").unwrap());
    }

    #[test]
    fn has_no_compat_path() {
        let store = TmpStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get_compat("k").unwrap(), None);
    }

    #[test]
    fn backend_type_is_tmp() {
        assert_eq!(TmpStore::new().backend_type(), "tmp");
    }
}
