//! Comms subsystem: manages all external I/O channels.
//!
//! # Architecture
//!
//! Each inbound channel (webhook, long polling) implements
//! [`runtime::Component`] and is spawned as an independent concurrent task
//! by [`start`] via [`runtime::spawn_components`].  Channels capture their
//! shared [`Arc<CommsState>`] at construction time; outbound traffic always
//! goes through the responder's [`Transport`].
//!
//! An intra-subsystem [`mpsc`] channel lets running channels signal the
//! comms manager (lifecycle events, handled updates).  It is drained in a
//! short-lived background task that dies naturally when all senders are
//! dropped.
//!
//! [`runtime::Component`]: crate::subsystems::runtime::Component
//! [`runtime::spawn_components`]: crate::subsystems::runtime::spawn_components

pub mod bot_api;
mod state;
#[cfg(feature = "channel-telegram")]
pub mod telegram;
pub mod transport;
pub mod update;
#[cfg(feature = "channel-webhook")]
pub mod webhook;

pub use state::{CommsEvent, CommsState, StatusReport};
pub use transport::Transport;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::subsystems::responder::Responder;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};

/// Public URL Telegram should post updates to, when one is configured.
pub fn webhook_url(config: &Config) -> Option<String> {
    config
        .comms
        .webhook
        .public_url
        .as_ref()
        .map(|base| format!("{base}{}", config.comms.webhook.path))
}

// ── start ───────────────────────────────────────────────────────────────────

/// Spawn all configured comms channels and return a [`SubsystemHandle`].
///
/// Channels start immediately.  If any channel exits with an error the shared
/// `shutdown` token is cancelled so siblings stop cooperatively.  The handle
/// resolves when all channels have exited.
///
/// # Non-blocking
///
/// This function is synchronous: it returns as soon as the tasks are
/// spawned.  The caller decides when (or whether) to await the handle.
pub fn start(
    config: &Config,
    responder: Arc<Responder>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(64);
    let state = Arc::new(CommsState::new(
        config.bot_name.clone(),
        responder,
        event_tx,
        webhook_url(config),
    ));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-webhook")]
    {
        if config.comms_webhook_should_load() {
            info!(bind = %config.comms.webhook.bind, path = %config.comms.webhook.path, "loading webhook channel");
            components.push(Box::new(webhook::WebhookChannel::new(
                "webhook0",
                config.comms.webhook.bind.clone(),
                config.comms.webhook.path.clone(),
                state.clone(),
            )));
        }
    }

    #[cfg(feature = "channel-telegram")]
    {
        if config.comms_telegram_should_load() {
            match config.bot_token.clone() {
                Some(token) => {
                    info!("loading telegram polling channel");
                    components.push(Box::new(telegram::TelegramChannel::new(
                        "telegram0",
                        token,
                        state.clone(),
                    )));
                }
                None => tracing::warn!("telegram polling enabled but no bot token set"),
            }
        }
    }

    if components.is_empty() {
        info!("no comms channels enabled; idling until shutdown");
    }

    // Monitoring-only drain; errors here never affect lifecycle.
    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelStarted { ref channel_id } => {
                    debug!(channel_id, "channel started");
                }
                CommsEvent::ChannelShutdown { ref channel_id } => {
                    debug!(channel_id, "channel reported shutdown");
                }
                CommsEvent::UpdateHandled { ref channel_id, disposition } => {
                    debug!(channel_id, disposition, "update handled");
                }
            }
        }
    });

    spawn_components(components, shutdown)
}
