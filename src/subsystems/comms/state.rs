//! Shared state for the Comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below.  The [`Responder`] is private; channels hand over
//! normalized events and never touch the store or transport directly.
//!
//! # Intra-subsystem events
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! subsystem manager without blocking.  The manager owns the receiver end.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OnceCell, mpsc};
use tracing::{info, warn};

use crate::subsystems::responder::event::InboundEvent;
use crate::subsystems::responder::{Disposition, Responder};

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or shutdown).
    ChannelShutdown { channel_id: String },
    /// Channel is up and receiving updates.
    ChannelStarted { channel_id: String },
    /// One update was processed.
    UpdateHandled { channel_id: String, disposition: &'static str },
}

// ── Status ────────────────────────────────────────────────────────────────────

/// Body of the diagnostic `GET` on the webhook route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub message: String,
    pub bot_active: bool,
    pub reactions_count: usize,
    pub reactions: Vec<String>,
    pub webhook_registered: bool,
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    bot_name: String,
    responder: Arc<Responder>,
    /// Back-channel to the comms subsystem manager.
    event_tx: mpsc::Sender<CommsEvent>,
    /// Full public URL Telegram should post updates to.
    webhook_url: Option<String>,
    /// Outcome of the single registration attempt made by this process.
    webhook: OnceCell<bool>,
}

impl CommsState {
    pub fn new(
        bot_name: impl Into<String>,
        responder: Arc<Responder>,
        event_tx: mpsc::Sender<CommsEvent>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            responder,
            event_tx,
            webhook_url,
            webhook: OnceCell::new(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Hand one normalized event to the responder.
    pub async fn dispatch(&self, channel_id: &str, event: InboundEvent) -> Disposition {
        let disposition = self.responder.handle(event).await;
        self.report_event(CommsEvent::UpdateHandled {
            channel_id: channel_id.to_string(),
            disposition: disposition_label(&disposition),
        });
        disposition
    }

    /// Register the webhook with the provider, at most once per process.
    ///
    /// Returns whether registration succeeded.  Without a configured public
    /// URL nothing is attempted.
    pub async fn ensure_webhook(&self) -> bool {
        let Some(url) = self.webhook_url.as_deref() else {
            return false;
        };
        *self
            .webhook
            .get_or_init(|| async {
                match self.responder.transport().register_webhook(url).await {
                    Ok(()) => {
                        info!(%url, "webhook registered");
                        true
                    }
                    Err(e) => {
                        warn!(%url, "webhook registration failed: {e}");
                        false
                    }
                }
            })
            .await
    }

    pub fn webhook_registered(&self) -> bool {
        self.webhook.get().copied().unwrap_or(false)
    }

    pub async fn status(&self) -> StatusReport {
        let reactions = self.responder.rules().responses().await.reactions;
        let message = match &self.webhook_url {
            Some(url) => format!("Webhook set to {url}"),
            None => "Webhook URL not configured".to_string(),
        };
        StatusReport {
            message,
            bot_active: self.responder.activation().is_active().await,
            reactions_count: reactions.len(),
            reactions,
            webhook_registered: self.webhook_registered(),
        }
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}

fn disposition_label(disposition: &Disposition) -> &'static str {
    match disposition {
        Disposition::Ignored => "ignored",
        Disposition::Command(name) => *name,
        Disposition::Media => "media",
        Disposition::Classified(outcome) => outcome.label(),
    }
}
