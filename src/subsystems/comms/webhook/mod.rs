//! Webhook channel: receives Telegram updates over HTTP via axum.
//!
//! Implements [`Component`] so it slots into the comms subsystem lifecycle:
//! `run()` drives the axum event loop and the shared [`CancellationToken`]
//! is wired to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! POST {path}       : one Telegram Update per request (default /api/telegram)
//! GET  {path}       : register the webhook once, report bot status
//! GET  /api/health  : liveness
//! ```

mod api;

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone: all fields are reference-counted.
#[derive(Clone)]
pub struct WebhookState {
    /// Channel identifier used in log spans.
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

impl WebhookState {
    pub fn new(channel_id: &str, comms: Arc<CommsState>) -> Self {
        Self { channel_id: Arc::from(channel_id), comms }
    }
}

// ── WebhookChannel ────────────────────────────────────────────────────────────

pub struct WebhookChannel {
    channel_id: String,
    bind_addr: String,
    path: String,
    state: Arc<CommsState>,
}

impl WebhookChannel {
    pub fn new(
        channel_id: impl Into<String>,
        bind_addr: impl Into<String>,
        path: impl Into<String>,
        state: Arc<CommsState>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            path: path.into(),
            state,
        }
    }
}

impl Component for WebhookChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_webhook(
            self.channel_id,
            self.bind_addr,
            self.path,
            self.state,
            shutdown,
        ))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_webhook(
    channel_id: String,
    bind_addr: String,
    path: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(&path, WebhookState::new(&channel_id, comms.clone()));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("webhook bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, %path, "webhook channel listening");
    comms.report_event(CommsEvent::ChannelStarted { channel_id: channel_id.clone() });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("webhook server error: {e}")))?;

    info!(%channel_id, "webhook channel shut down");
    comms.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the webhook router.  `path` must start with `/`.
pub fn build_router(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route(path, get(api::status).post(api::update))
        .with_state(state)
}
