//! Backend trait: the raw key/value operations a store supports.
//!
//! Backends are blocking and string-valued; [`PersistentStore`](super::PersistentStore)
//! moves every call onto the blocking pool, bounds it with a timeout and
//! handles JSON decoding plus repair-to-default on top.

use crate::error::StoreError;

/// Pluggable key/value backend.
pub trait KvBackend: Send + Sync {
    /// Unique type name for this backend (e.g. `"json_file"`).
    fn backend_type(&self) -> &str;

    /// Primary retrieval path.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Compatibility retrieval path, consulted when [`get`](Self::get)
    /// yields nothing.  Backends without a legacy source keep the default.
    fn get_compat(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    /// Overwrite the full value for `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key` from the primary path.  Returns `true` if it existed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}
