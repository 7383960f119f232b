//! Normalized inbound events.
//!
//! Every channel resolves its wire payload exactly once at ingress into an
//! [`InboundEvent`]; nothing downstream looks at optional nested fields.

/// Kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ConversationKind {
    /// Map a Telegram `chat.type` string.  Unknown kinds are treated as
    /// channels, which the classifier never processes.
    pub fn from_telegram(kind: &str) -> Self {
        match kind {
            "private" => Self::Private,
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            _ => Self::Channel,
        }
    }

    pub fn is_multi_party(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }

    /// Message reactions are not available in one-to-one chats.
    pub fn supports_reactions(self) -> bool {
        self != Self::Private
    }
}

/// Fields every message-bearing event carries.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMeta {
    pub conversation_id: i64,
    pub conversation_kind: ConversationKind,
    pub message_id: i32,
    /// Sender identity normalized to its decimal string form.
    pub sender_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextMessage {
    pub meta: MessageMeta,
    pub text: String,
    /// Text of the message this one replies to, when that message had text.
    pub reply_to_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Sticker,
    Document,
    Audio,
    Voice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaMessage {
    pub meta: MessageMeta,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Text(TextMessage),
    Media(MediaMessage),
    /// Anything else (service messages, callback queries, edits …).
    Other,
}

impl InboundEvent {
    pub fn meta(&self) -> Option<&MessageMeta> {
        match self {
            Self::Text(m) => Some(&m.meta),
            Self::Media(m) => Some(&m.meta),
            Self::Other => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Media(_) => "media",
            Self::Other => "other",
        }
    }
}
