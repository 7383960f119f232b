//! Outbound transport contract.
//!
//! The responder only ever talks to a chat provider through [`Transport`].
//! [`BotApiClient`](super::bot_api::BotApiClient) is the production
//! implementation; [`RecordingTransport`] captures calls in memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::error::TransportError;

/// A boxed future returned by every [`Transport`] method.
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

pub trait Transport: Send + Sync {
    /// Stable identifier used in log messages.
    fn name(&self) -> &str;

    fn send<'a>(&'a self, conversation_id: i64, text: &'a str) -> TransportFuture<'a>;

    fn set_reaction<'a>(
        &'a self,
        conversation_id: i64,
        message_id: i32,
        glyph: &'a str,
    ) -> TransportFuture<'a>;

    fn delete(&self, conversation_id: i64, message_id: i32) -> TransportFuture<'_>;

    fn register_webhook<'a>(&'a self, url: &'a str) -> TransportFuture<'a>;
}

// ── RecordingTransport ───────────────────────────────────────────────────────

/// One outbound call as seen by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCall {
    Send { conversation_id: i64, text: String },
    React { conversation_id: i64, message_id: i32, glyph: String },
    Delete { conversation_id: i64, message_id: i32 },
    RegisterWebhook { url: String },
}

/// In-memory transport that records every call.
///
/// A failure can be armed per call kind to exercise error paths; the call is
/// still recorded before the error is returned.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<OutboundCall>>,
    failures: Mutex<Failures>,
}

#[derive(Default)]
struct Failures {
    send: Option<TransportError>,
    react: Option<TransportError>,
    delete: Option<TransportError>,
    webhook: Option<TransportError>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<OutboundCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                OutboundCall::Send { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn fail_sends(&self, err: TransportError) {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).send = Some(err);
    }

    pub fn fail_reactions(&self, err: TransportError) {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).react = Some(err);
    }

    pub fn fail_deletes(&self, err: TransportError) {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).delete = Some(err);
    }

    pub fn fail_webhook(&self, err: TransportError) {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).webhook = Some(err);
    }

    fn record(
        &self,
        call: OutboundCall,
        pick: fn(&Failures) -> &Option<TransportError>,
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).push(call);
        let failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());
        match pick(&failures) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    fn send<'a>(&'a self, conversation_id: i64, text: &'a str) -> TransportFuture<'a> {
        let result = self.record(
            OutboundCall::Send { conversation_id, text: text.to_string() },
            |f| &f.send,
        );
        Box::pin(async move { result })
    }

    fn set_reaction<'a>(
        &'a self,
        conversation_id: i64,
        message_id: i32,
        glyph: &'a str,
    ) -> TransportFuture<'a> {
        let result = self.record(
            OutboundCall::React { conversation_id, message_id, glyph: glyph.to_string() },
            |f| &f.react,
        );
        Box::pin(async move { result })
    }

    fn delete(&self, conversation_id: i64, message_id: i32) -> TransportFuture<'_> {
        let result = self.record(OutboundCall::Delete { conversation_id, message_id }, |f| &f.delete);
        Box::pin(async move { result })
    }

    fn register_webhook<'a>(&'a self, url: &'a str) -> TransportFuture<'a> {
        let result = self.record(OutboundCall::RegisterWebhook { url: url.to_string() }, |f| &f.webhook);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let t = RecordingTransport::new();
        t.send(1, "salom").await.unwrap();
        t.set_reaction(1, 2, "🔥").await.unwrap();
        t.delete(1, 3).await.unwrap();

        assert_eq!(
            t.calls(),
            vec![
                OutboundCall::Send { conversation_id: 1, text: "salom".into() },
                OutboundCall::React { conversation_id: 1, message_id: 2, glyph: "🔥".into() },
                OutboundCall::Delete { conversation_id: 1, message_id: 3 },
            ]
        );
        assert_eq!(t.sent_texts(), vec!["salom".to_string()]);
    }

    #[tokio::test]
    async fn armed_failure_is_returned_after_recording() {
        let t = RecordingTransport::new();
        t.fail_reactions(TransportError::Forbidden("no rights".into()));

        let err = t.set_reaction(1, 2, "👍").await.unwrap_err();
        assert_eq!(err, TransportError::Forbidden("no rights".into()));
        assert_eq!(t.calls().len(), 1);
        assert!(t.send(1, "ok").await.is_ok());
    }
}
