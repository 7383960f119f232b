//! Task scaffolding shared by the long-running parts of the bot.
//!
//! # Component model
//!
//! A [`Component`] is one inbound channel (webhook listener, long poller)
//! with its `Arc<CommsState>` already captured.  [`spawn_components`] runs
//! each on its own Tokio task and hands back a [`SubsystemHandle`].
//!
//! A channel that fails cancels the shared [`CancellationToken`], so the
//! remaining channels and `main` wind down together.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

// ── Component ─────────────────────────────────────────────────────────────────

/// Boxed run-loop returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// An independently running channel.
///
/// [`Component::run`] is called exactly once and should return when
/// `shutdown` is cancelled or the channel can no longer serve.
pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

// ── SubsystemHandle ───────────────────────────────────────────────────────────

/// Resolves once every spawned component has exited.
pub struct SubsystemHandle {
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    /// Await all components and return the first error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Comms(format!("channel manager panicked: {e}"))),
        }
    }
}

// ── spawn_components ──────────────────────────────────────────────────────────

/// Spawn each component and return a handle over the whole set.
///
/// With no components the handle waits for `shutdown` instead of resolving
/// straight away, so an idle process still exits only on a signal.
pub fn spawn_components(
    components: Vec<Box<dyn Component>>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let handle = tokio::spawn(async move {
        if components.is_empty() {
            shutdown.cancelled().await;
            return Ok(());
        }

        let mut set: JoinSet<Result<(), AppError>> = JoinSet::new();
        for component in components {
            debug!(component = component.id(), "spawning component");
            set.spawn(component.run(shutdown.clone()));
        }

        let mut first_err: Option<AppError> = None;
        while let Some(res) = set.join_next().await {
            match res {
                Err(e) => {
                    error!("component panicked: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert_with(|| AppError::Comms(format!("component panicked: {e}")));
                }
                Ok(Err(e)) => {
                    error!("component error: {e}");
                    shutdown.cancel();
                    first_err.get_or_insert(e);
                }
                Ok(Ok(())) => {}
            }
        }

        info!("all channels stopped");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    });

    SubsystemHandle { inner: handle }
}
