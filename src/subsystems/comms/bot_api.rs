//! Telegram Bot API client: the production [`Transport`].
//!
//! All Bot API wire types are private to this module.  Every reply is an
//! envelope `{ok, result | error_code, description, parameters}`; failures
//! are classified into [`TransportError`] so callers can log them precisely.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::transport::{Transport, TransportFuture};
use crate::error::{AppError, TransportError};

/// Telegram rejects messages above 4096 characters; chunk below that.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

// ── Public client ─────────────────────────────────────────────────────────────

/// Cheap to clone: `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct BotApiClient {
    client: Client,
    /// `{api_base_url}/bot{token}`, never logged.
    endpoint: String,
    timeout: Duration,
}

impl BotApiClient {
    pub fn new(api_base_url: &str, token: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Comms(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}", api_base_url.trim_end_matches('/')),
            timeout,
        })
    }

    /// POST one Bot API method and decode the envelope.
    async fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<(), TransportError> {
        let url = format!("{}/{method}", self.endpoint);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(self.timeout.as_millis() as u64)
            } else {
                // Strip the URL so the token never reaches the logs.
                TransportError::Network(e.without_url().to_string())
            }
        })?;

        let status = response.status().as_u16();
        let envelope = response
            .json::<Envelope>()
            .await
            .map_err(|e| TransportError::Api {
                code: status,
                description: format!("unreadable response: {}", e.without_url()),
            })?;

        if envelope.ok {
            debug!(method, "bot api call ok");
            return Ok(());
        }

        let err = classify(
            envelope.error_code.unwrap_or(status),
            envelope.description.unwrap_or_default(),
            envelope.parameters.and_then(|p| p.retry_after),
        );
        warn!(method, "bot api call failed: {err}");
        Err(err)
    }

    async fn send_chunked(&self, conversation_id: i64, text: &str) -> Result<(), TransportError> {
        for chunk in chunk_text(text, MAX_MESSAGE_LENGTH) {
            self.call("sendMessage", &SendMessage { chat_id: conversation_id, text: &chunk })
                .await?;
        }
        Ok(())
    }
}

impl Transport for BotApiClient {
    fn name(&self) -> &str {
        "bot_api"
    }

    fn send<'a>(&'a self, conversation_id: i64, text: &'a str) -> TransportFuture<'a> {
        Box::pin(self.send_chunked(conversation_id, text))
    }

    fn set_reaction<'a>(
        &'a self,
        conversation_id: i64,
        message_id: i32,
        glyph: &'a str,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let body = SetMessageReaction {
                chat_id: conversation_id,
                message_id,
                reaction: [ReactionType { kind: "emoji", emoji: glyph }],
                is_big: false,
            };
            self.call("setMessageReaction", &body).await
        })
    }

    fn delete(&self, conversation_id: i64, message_id: i32) -> TransportFuture<'_> {
        Box::pin(async move {
            let body = DeleteMessage { chat_id: conversation_id, message_id };
            self.call("deleteMessage", &body).await
        })
    }

    fn register_webhook<'a>(&'a self, url: &'a str) -> TransportFuture<'a> {
        Box::pin(async move { self.call("setWebhook", &SetWebhook { url }).await })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Map a Bot API error code onto the transport taxonomy.
pub fn classify(code: u16, description: String, retry_after: Option<u64>) -> TransportError {
    match code {
        400 => TransportError::BadRequest(description),
        403 => TransportError::Forbidden(description),
        429 => TransportError::RateLimited { retry_after, description },
        code => TransportError::Api { code, description },
    }
}

/// Split `text` into pieces of at most `max` characters (not bytes).
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    if text.is_empty() || max == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct ReactionType<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    emoji: &'a str,
}

#[derive(Serialize)]
struct SetMessageReaction<'a> {
    chat_id: i64,
    message_id: i32,
    reaction: [ReactionType<'a>; 1],
    is_big: bool,
}

#[derive(Serialize)]
struct DeleteMessage {
    chat_id: i64,
    message_id: i32,
}

#[derive(Serialize)]
struct SetWebhook<'a> {
    url: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_are_classified() {
        assert!(matches!(classify(400, "bad".into(), None), TransportError::BadRequest(_)));
        assert!(matches!(classify(403, "no".into(), None), TransportError::Forbidden(_)));
        assert_eq!(
            classify(429, "slow down".into(), Some(7)),
            TransportError::RateLimited { retry_after: Some(7), description: "slow down".into() }
        );
        assert_eq!(
            classify(502, "gateway".into(), None),
            TransportError::Api { code: 502, description: "gateway".into() }
        );
    }

    #[test]
    fn chunks_by_characters() {
        let text = "ё".repeat(9);
        let chunks = chunk_text(&text, 4);
        assert_eq!(chunks.iter().map(|c| c.chars().count()).collect::<Vec<_>>(), vec![4, 4, 1]);
        assert_eq!(chunk_text("salom", MAX_MESSAGE_LENGTH), vec!["salom".to_string()]);
    }

    #[test]
    fn reaction_body_matches_bot_api_shape() {
        let body = SetMessageReaction {
            chat_id: -100,
            message_id: 5,
            reaction: [ReactionType { kind: "emoji", emoji: "🔥" }],
            is_big: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "chat_id": -100,
                "message_id": 5,
                "reaction": [{"type": "emoji", "emoji": "🔥"}],
                "is_big": false,
            })
        );
    }

    #[test]
    fn error_envelope_decodes() {
        let env: Envelope = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":3}}"#,
        )
        .unwrap();
        assert!(!env.ok);
        assert_eq!(env.error_code, Some(429));
        assert_eq!(env.parameters.and_then(|p| p.retry_after), Some(3));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_network_error() {
        let client = BotApiClient::new("http://127.0.0.1:9", "t", Duration::from_secs(2)).unwrap();
        let err = client.delete(1, 1).await.unwrap_err();
        assert!(
            matches!(err, TransportError::Network(_) | TransportError::Timeout(_)),
            "{err:?}"
        );
    }
}
