//! Telegram long-polling channel: local development alternative to the
//! webhook.  Incoming messages are normalized into [`InboundEvent`]s and
//! handed to the responder; replies go out through the shared transport.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{Chat, Message as TgMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::responder::event::{
    ConversationKind, InboundEvent, MediaKind, MediaMessage, MessageMeta, TextMessage,
};
use crate::subsystems::runtime::{Component, ComponentFuture};
use super::state::{CommsEvent, CommsState};

// ── TelegramChannel ──────────────────────────────────────────────────────────

pub struct TelegramChannel {
    channel_id: String,
    token: String,
    state: Arc<CommsState>,
}

impl TelegramChannel {
    pub fn new(channel_id: impl Into<String>, token: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), token: token.into(), state }
    }
}

impl Component for TelegramChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_telegram(self.channel_id, self.token, self.state, shutdown))
    }
}

// ── run_telegram ─────────────────────────────────────────────────────────────

async fn run_telegram(
    channel_id: String,
    token: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "telegram polling channel starting");

    let bot = Bot::new(token);

    // Polling and webhooks are mutually exclusive on the Bot API side.
    if let Err(e) = bot.delete_webhook().await {
        warn!(%channel_id, "could not clear webhook before polling: {e}");
    }

    let state_clone = state.clone();
    let channel_id_clone = channel_id.clone();

    let handler = Update::filter_message().endpoint(move |msg: TgMessage| {
        let state = state_clone.clone();
        let channel_id = channel_id_clone.clone();
        async move {
            let event = to_event(&msg);
            debug!(%channel_id, kind = event.kind_label(), "telegram received message");
            state.dispatch(&channel_id, event).await;
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot, handler).build();
    state.report_event(CommsEvent::ChannelStarted { channel_id: channel_id.clone() });

    tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            info!(%channel_id, "shutdown signal received: closing telegram channel");
        }
        _ = dispatcher.dispatch() => {
            warn!(%channel_id, "telegram dispatcher exited unexpectedly");
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

// ── Normalization ────────────────────────────────────────────────────────────

fn conversation_kind(chat: &Chat) -> ConversationKind {
    if chat.is_private() {
        ConversationKind::Private
    } else if chat.is_supergroup() {
        ConversationKind::Supergroup
    } else if chat.is_group() {
        ConversationKind::Group
    } else {
        ConversationKind::Channel
    }
}

fn media_kind(msg: &TgMessage) -> Option<MediaKind> {
    if msg.photo().is_some() {
        Some(MediaKind::Photo)
    } else if msg.video().is_some() {
        Some(MediaKind::Video)
    } else if msg.sticker().is_some() {
        Some(MediaKind::Sticker)
    } else if msg.document().is_some() {
        Some(MediaKind::Document)
    } else if msg.audio().is_some() {
        Some(MediaKind::Audio)
    } else if msg.voice().is_some() {
        Some(MediaKind::Voice)
    } else {
        None
    }
}

fn to_event(msg: &TgMessage) -> InboundEvent {
    let meta = MessageMeta {
        conversation_id: msg.chat.id.0,
        conversation_kind: conversation_kind(&msg.chat),
        message_id: msg.id.0,
        sender_id: msg.from.as_ref().map(|u| u.id.0.to_string()),
    };

    if let Some(text) = msg.text() {
        return InboundEvent::Text(TextMessage {
            meta,
            text: text.to_string(),
            reply_to_text: msg.reply_to_message().and_then(|p| p.text()).map(str::to_string),
        });
    }

    match media_kind(msg) {
        Some(kind) => InboundEvent::Media(MediaMessage { meta, kind }),
        None => InboundEvent::Other,
    }
}
