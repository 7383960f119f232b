//! Responder subsystem: turns one inbound event into at most one action.
//!
//! # Pipeline
//!
//! ```text
//! InboundEvent
//!   ├─ /command ──────────────► commands::execute (any chat, active or not)
//!   └─ gate: group chat + active
//!        ├─ reaction (best-effort side channel)
//!        └─ text only: classifier ─► QaStore | Delete | *Reply | NoOp
//! ```
//!
//! State (rules, replies, glyphs, activation flag) is reloaded from the store
//! for every event.  Outbound calls are bounded by the configured timeout and
//! their failures are logged, never propagated.

pub mod activation;
pub mod classifier;
pub mod commands;
pub mod event;
pub mod qa;
pub mod reactions;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::ResponderConfig;
use crate::subsystems::comms::transport::{Transport, TransportFuture};
use crate::subsystems::memory::PersistentStore;
use activation::{ActivationController, AdminAllowList};
use classifier::{MessageClassifier, Outcome};
use commands::{Action, Command, CommandContext};
use event::{InboundEvent, MessageMeta, TextMessage};
use qa::QaMemory;
use reactions::ReactionSelector;
use rules::RuleRepository;

/// What the responder did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Gated out: inactive, not a group chat, or nothing to act on.
    Ignored,
    /// A slash-command was executed.
    Command(&'static str),
    /// Media message; only the reaction side channel ran.
    Media,
    Classified(Outcome),
}

pub struct Responder {
    activation: ActivationController,
    rules: RuleRepository,
    qa: QaMemory,
    reactions: ReactionSelector,
    classifier: MessageClassifier,
    transport: Arc<dyn Transport>,
    greeting: String,
    bot_username: Option<String>,
    outbound_timeout: Duration,
}

impl Responder {
    pub fn new(
        store: PersistentStore,
        transport: Arc<dyn Transport>,
        config: &ResponderConfig,
        admins: AdminAllowList,
        outbound_timeout: Duration,
    ) -> Self {
        Self {
            activation: ActivationController::new(store.clone(), admins),
            rules: RuleRepository::new(store.clone()),
            qa: QaMemory::new(store, config.qa_cap),
            reactions: ReactionSelector::new(config.reaction_probability),
            classifier: MessageClassifier::new(config),
            transport,
            greeting: config.greeting.clone(),
            bot_username: config.bot_username.clone(),
            outbound_timeout,
        }
    }

    /// Replace both random sources with seeded generators.
    pub fn with_seed(mut self, config: &ResponderConfig, seed: u64) -> Self {
        self.reactions =
            ReactionSelector::with_rng(config.reaction_probability, StdRng::seed_from_u64(seed));
        self.classifier = MessageClassifier::with_rng(config, StdRng::seed_from_u64(seed ^ 0x9e37));
        self
    }

    pub fn activation(&self) -> &ActivationController {
        &self.activation
    }

    pub fn rules(&self) -> &RuleRepository {
        &self.rules
    }

    pub fn qa(&self) -> &QaMemory {
        &self.qa
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Process one inbound event.  Never fails.
    pub async fn handle(&self, event: InboundEvent) -> Disposition {
        let Some(meta) = event.meta().cloned() else {
            debug!("ignoring non-message update");
            return Disposition::Ignored;
        };

        if let InboundEvent::Text(message) = &event {
            if let Some(cmd) = Command::parse(&message.text, self.bot_username.as_deref()) {
                self.run_command(&cmd, &meta).await;
                return Disposition::Command(cmd.name());
            }
        }

        if !meta.conversation_kind.is_multi_party() {
            debug!(chat_id = meta.conversation_id, "not a group chat, ignoring");
            return Disposition::Ignored;
        }
        if !self.activation.is_active().await {
            debug!(chat_id = meta.conversation_id, "bot inactive, ignoring");
            return Disposition::Ignored;
        }

        let rule_set = self.rules.load().await;
        self.react(&meta, &rule_set.responses.reactions).await;

        let message = match event {
            InboundEvent::Text(message) => message,
            InboundEvent::Media(media) => {
                debug!(
                    chat_id = meta.conversation_id,
                    message_id = meta.message_id,
                    kind = ?media.kind,
                    "media message handled"
                );
                return Disposition::Media;
            }
            InboundEvent::Other => return Disposition::Ignored,
        };

        let pairs = if message.reply_to_text.is_none() {
            self.qa.pairs().await
        } else {
            Vec::new()
        };
        let outcome = self.classifier.classify(&message, &rule_set, &pairs);
        self.perform(&message, &outcome).await;

        info!(
            chat_id = meta.conversation_id,
            message_id = meta.message_id,
            outcome = outcome.label(),
            "message handled"
        );
        Disposition::Classified(outcome)
    }

    async fn perform(&self, message: &TextMessage, outcome: &Outcome) {
        let meta = &message.meta;
        match outcome {
            Outcome::NoOp => {}
            Outcome::QaStore { question, answer } => {
                self.qa.capture(question, answer).await;
            }
            Outcome::Delete => {
                self.deliver(
                    "delete",
                    meta,
                    self.transport.delete(meta.conversation_id, meta.message_id),
                )
                .await;
            }
            Outcome::QaReply(text) | Outcome::RuleReply(text) | Outcome::FallbackReply(text) => {
                self.deliver("send", meta, self.transport.send(meta.conversation_id, text))
                    .await;
            }
        }
    }

    async fn run_command(&self, cmd: &Command, meta: &MessageMeta) {
        let ctx = CommandContext {
            activation: &self.activation,
            rules: &self.rules,
            greeting: &self.greeting,
        };
        let actions = commands::execute(cmd, meta.sender_id.as_deref(), &ctx).await;
        info!(
            chat_id = meta.conversation_id,
            message_id = meta.message_id,
            command = cmd.name(),
            "command handled"
        );

        for action in actions {
            match action {
                Action::Reply(text) => {
                    self.deliver("send", meta, self.transport.send(meta.conversation_id, &text))
                        .await;
                }
                Action::React(glyph) => self.send_reaction(meta, &glyph).await,
            }
        }
    }

    /// Random reaction; best-effort.
    async fn react(&self, meta: &MessageMeta, glyphs: &[String]) {
        match self.reactions.select(glyphs) {
            Some(glyph) => self.send_reaction(meta, &glyph).await,
            None => debug!(chat_id = meta.conversation_id, "reaction skipped"),
        }
    }

    async fn send_reaction(&self, meta: &MessageMeta, glyph: &str) {
        if !meta.conversation_kind.supports_reactions() {
            debug!(chat_id = meta.conversation_id, "reactions unsupported in private chats");
            return;
        }
        let sent = self
            .deliver(
                "reaction",
                meta,
                self.transport.set_reaction(meta.conversation_id, meta.message_id, glyph),
            )
            .await;
        if sent {
            debug!(chat_id = meta.conversation_id, message_id = meta.message_id, glyph, "reaction added");
        }
    }

    /// Await one outbound call under the timeout, logging any failure.
    async fn deliver(&self, op: &'static str, meta: &MessageMeta, call: TransportFuture<'_>) -> bool {
        match tokio::time::timeout(self.outbound_timeout, call).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    chat_id = meta.conversation_id,
                    message_id = meta.message_id,
                    transport = self.transport.name(),
                    op,
                    "outbound call failed: {e}"
                );
                false
            }
            Err(_) => {
                warn!(
                    chat_id = meta.conversation_id,
                    message_id = meta.message_id,
                    transport = self.transport.name(),
                    op,
                    timeout_ms = self.outbound_timeout.as_millis() as u64,
                    "outbound call timed out"
                );
                false
            }
        }
    }
}
