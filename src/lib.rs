//! guruh-bot library: config, errors, logging and the subsystems, shared
//! by the binary and the integration tests.

pub mod config;
pub mod error;
pub mod logger;
pub mod subsystems;
