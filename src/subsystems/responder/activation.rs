//! Activation switch and admin allow-list.
//!
//! The flag lives in the store under [`STATE_KEY`] and is re-read for every
//! event, so it survives restarts and is shared by concurrent invocations.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ActivationError, AuthorizationError, StoreError};
use crate::subsystems::memory::PersistentStore;

pub const STATE_KEY: &str = "bot_state";

/// Persisted activation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationState {
    pub active: bool,
}

impl Default for ActivationState {
    fn default() -> Self {
        Self { active: true }
    }
}

/// Canonical form of an identity: trimmed, and numeric ids reformatted so
/// `"0042"`, `"+42"` and `42` all compare equal.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(n) => n.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Identities allowed to run admin commands.  Empty = everyone.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    ids: HashSet<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(|id| normalize_identity(id.as_ref()))
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_admin(&self, identity: Option<&str>) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        identity.is_some_and(|id| self.ids.contains(&normalize_identity(id)))
    }

    pub fn check(&self, identity: Option<&str>, command: &str) -> Result<(), AuthorizationError> {
        if self.is_admin(identity) {
            Ok(())
        } else {
            Err(AuthorizationError {
                identity: identity.unwrap_or("<unknown>").to_string(),
                command: command.to_string(),
            })
        }
    }
}

/// Result of a `/start` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Admin turned an inactive bot back on.
    Resumed,
    /// Already active, or the caller is not an admin.
    Unchanged,
}

pub struct ActivationController {
    store: PersistentStore,
    admins: AdminAllowList,
}

impl ActivationController {
    pub fn new(store: PersistentStore, admins: AdminAllowList) -> Self {
        Self { store, admins }
    }

    pub fn admins(&self) -> &AdminAllowList {
        &self.admins
    }

    pub async fn state(&self) -> ActivationState {
        self.store.load_or_init(STATE_KEY, ActivationState::default).await
    }

    pub async fn is_active(&self) -> bool {
        self.state().await.active
    }

    /// `ACTIVE → INACTIVE`.  Non-admins are rejected and nothing changes;
    /// a failed write is reported rather than claimed as done.
    pub async fn stop(&self, identity: Option<&str>) -> Result<(), ActivationError> {
        if let Err(denied) = self.admins.check(identity, "stop") {
            warn!(identity = ?identity, "unauthorized /stop attempt");
            return Err(denied.into());
        }
        self.persist(false).await?;
        info!(identity = ?identity, "bot deactivated");
        Ok(())
    }

    /// `INACTIVE → ACTIVE` for admins; a no-op for everyone else.
    pub async fn resume(&self, identity: Option<&str>) -> Result<Resume, StoreError> {
        if !self.admins.is_admin(identity) || self.is_active().await {
            return Ok(Resume::Unchanged);
        }
        self.persist(true).await?;
        info!(identity = ?identity, "bot activated");
        Ok(Resume::Resumed)
    }

    async fn persist(&self, active: bool) -> Result<(), StoreError> {
        self.store
            .save(STATE_KEY, &ActivationState { active })
            .await
            .inspect_err(|e| warn!(active, "cannot persist activation state: {e}"))
    }
}
