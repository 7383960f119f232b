//! Application-wide error types.
//!
//! [`AppError`] covers startup and channel lifecycle failures.  The per-event
//! taxonomy ([`StoreError`], [`TransportError`], [`ValidationError`],
//! [`AuthorizationError`]) never escapes a handler: the responder logs and
//! continues, the webhook turns validation failures into a 400.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent store failures.  Decode failures trigger repair-to-default.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{backend} backend failed on '{key}': {reason}")]
    Backend {
        backend: String,
        key: String,
        reason: String,
    },

    #[error("cannot decode '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("cannot encode '{key}': {reason}")]
    Encode { key: String, reason: String },

    #[error("{op} on '{key}' timed out after {ms} ms")]
    Timeout {
        op: &'static str,
        key: String,
        ms: u64,
    },

    #[error("store task failed: {0}")]
    Join(String),
}

impl StoreError {
    pub fn backend(backend: &str, key: &str, reason: impl std::fmt::Display) -> Self {
        Self::Backend {
            backend: backend.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Outbound delivery failures (send / react / delete / webhook registration).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("rate limited (retry after {retry_after:?}s): {description}")]
    RateLimited {
        retry_after: Option<u64>,
        description: String,
    },

    #[error("api error {code}: {description}")]
    Api { code: u16, description: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),
}

/// Malformed inbound payload.  Rejected before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("empty request body")]
    EmptyBody,

    #[error("malformed update: {0}")]
    Malformed(String),
}

/// A non-admin identity invoked an admin-only command.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("identity '{identity}' is not allowed to run /{command}")]
pub struct AuthorizationError {
    pub identity: String,
    pub command: String,
}

/// Why an activation change did not happen.
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error(transparent)]
    Denied(#[from] AuthorizationError),

    #[error("activation state not saved: {0}")]
    Store(#[from] StoreError),
}
