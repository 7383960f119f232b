//! Key-value backend implementations.

pub mod json_file;
pub mod legacy;
#[cfg(feature = "store-sqlite")]
pub mod sqlite;
pub mod tmp;
