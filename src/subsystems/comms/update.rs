//! Ingress normalization for Telegram `Update` payloads.
//!
//! The wire shape is decoded into private serde types and resolved once into
//! an [`InboundEvent`].  Anything that is not a JSON object with an integer
//! `update_id` is a [`ValidationError`].

use serde::Deserialize;

use crate::error::ValidationError;
use crate::subsystems::responder::event::{
    ConversationKind, InboundEvent, MediaKind, MediaMessage, MessageMeta, TextMessage,
};

/// Decode one webhook body.
pub fn parse_update(body: &[u8]) -> Result<InboundEvent, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::EmptyBody);
    }
    let update: Update =
        serde_json::from_slice(body).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    Ok(update.into_event())
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Update {
    #[allow(dead_code)]
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i32,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reply_to_message: Option<Box<Message>>,
    #[serde(default)]
    photo: Option<serde_json::Value>,
    #[serde(default)]
    video: Option<serde_json::Value>,
    #[serde(default)]
    sticker: Option<serde_json::Value>,
    #[serde(default)]
    document: Option<serde_json::Value>,
    #[serde(default)]
    audio: Option<serde_json::Value>,
    #[serde(default)]
    voice: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
}

impl Update {
    fn into_event(self) -> InboundEvent {
        let Some(message) = self.message else {
            return InboundEvent::Other;
        };

        let media = message.media_kind();
        let meta = MessageMeta {
            conversation_id: message.chat.id,
            conversation_kind: ConversationKind::from_telegram(&message.chat.kind),
            message_id: message.message_id,
            sender_id: message.from.map(|u| u.id.to_string()),
        };

        match (message.text, media) {
            (Some(text), _) => InboundEvent::Text(TextMessage {
                meta,
                text,
                reply_to_text: message.reply_to_message.and_then(|parent| parent.text),
            }),
            (None, Some(kind)) => InboundEvent::Media(MediaMessage { meta, kind }),
            (None, None) => InboundEvent::Other,
        }
    }
}

impl Message {
    fn media_kind(&self) -> Option<MediaKind> {
        let present = |field: &Option<serde_json::Value>| {
            field.as_ref().is_some_and(|v| !v.is_null())
        };
        if present(&self.photo) {
            Some(MediaKind::Photo)
        } else if present(&self.video) {
            Some(MediaKind::Video)
        } else if present(&self.sticker) {
            Some(MediaKind::Sticker)
        } else if present(&self.document) {
            Some(MediaKind::Document)
        } else if present(&self.audio) {
            Some(MediaKind::Audio)
        } else if present(&self.voice) {
            Some(MediaKind::Voice)
        } else {
            None
        }
    }
}
