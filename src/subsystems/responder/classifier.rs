//! Priority-ordered decision chain for text messages.
//!
//! Order: reply capture → spam → learned answer → keyword rule → question
//! fallback → nothing.  The classifier only decides; the responder performs
//! the side effect attached to the returned [`Outcome`].

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use super::event::TextMessage;
use super::qa::{self, QaPair};
use super::rules::RuleSet;
use crate::config::ResponderConfig;

/// Exactly one decision per text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoOp,
    /// Remove the message (spam).
    Delete,
    /// Learn a pair from a reply; nothing is sent.
    QaStore { question: String, answer: String },
    QaReply(String),
    RuleReply(String),
    FallbackReply(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoOp => "noop",
            Self::Delete => "delete",
            Self::QaStore { .. } => "qa_store",
            Self::QaReply(_) => "qa_reply",
            Self::RuleReply(_) => "rule_reply",
            Self::FallbackReply(_) => "fallback_reply",
        }
    }
}

/// Compiled spam and question signatures.
#[derive(Debug, Clone)]
pub struct Signatures {
    spam: Vec<Regex>,
    question: Vec<Regex>,
}

impl Signatures {
    /// Compile both pattern sets case-insensitively.  Patterns that do not
    /// compile are dropped with a warning.
    pub fn new<S: AsRef<str>>(spam: &[S], question: &[S]) -> Self {
        Self {
            spam: compile_all("spam", spam),
            question: compile_all("question", question),
        }
    }

    pub fn is_spam(&self, text: &str) -> bool {
        self.spam.iter().any(|re| re.is_match(text))
    }

    pub fn is_question(&self, text: &str) -> bool {
        self.question.iter().any(|re| re.is_match(text))
    }
}

fn compile_all<S: AsRef<str>>(kind: &str, patterns: &[S]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            let p = p.as_ref();
            match RegexBuilder::new(p).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(kind, pattern = p, "ignoring signature: {e}");
                    None
                }
            }
        })
        .collect()
}

pub struct MessageClassifier {
    signatures: Signatures,
    default_fallback: String,
    rng: Mutex<StdRng>,
}

impl MessageClassifier {
    pub fn new(config: &ResponderConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Classifier with an explicit RNG for fallback reply picks.
    pub fn with_rng(config: &ResponderConfig, rng: StdRng) -> Self {
        Self {
            signatures: Signatures::new(&config.spam_patterns, &config.question_patterns),
            default_fallback: config.fallback_reply.clone(),
            rng: Mutex::new(rng),
        }
    }

    /// Decide what to do with one text message.
    ///
    /// `pairs` is the learned Q/A collection as loaded for this event.
    pub fn classify(&self, message: &TextMessage, rules: &RuleSet, pairs: &[QaPair]) -> Outcome {
        if let Some(parent) = message.reply_to_text.as_deref() {
            return Outcome::QaStore {
                question: qa::normalize(parent),
                answer: message.text.clone(),
            };
        }

        let text = qa::normalize(&message.text);

        if self.signatures.is_spam(&text) {
            return Outcome::Delete;
        }

        if let Some(pair) = qa::find_match(pairs, &text) {
            return Outcome::QaReply(pair.answer.clone());
        }

        if let Some(response) = rules.match_text(&text) {
            return Outcome::RuleReply(response.to_string());
        }

        if self.signatures.is_question(&text) {
            return Outcome::FallbackReply(self.pick_fallback(&rules.responses.question_replies));
        }

        Outcome::NoOp
    }

    fn pick_fallback(&self, replies: &[String]) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        replies
            .choose(&mut *rng)
            .cloned()
            .unwrap_or_else(|| self.default_fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::subsystems::responder::event::{ConversationKind, MessageMeta};
    use crate::subsystems::responder::rules::{self, KeywordRule, ResponseSet};

    fn classifier() -> MessageClassifier {
        let config = Config::test_default(Path::new("/tmp"));
        MessageClassifier::with_rng(&config.responder, StdRng::seed_from_u64(7))
    }

    fn message(text: &str, reply_to: Option<&str>) -> TextMessage {
        TextMessage {
            meta: MessageMeta {
                conversation_id: -100,
                conversation_kind: ConversationKind::Supergroup,
                message_id: 1,
                sender_id: Some("5".into()),
            },
            text: text.into(),
            reply_to_text: reply_to.map(str::to_string),
        }
    }

    fn rule_set(rules: &[(&str, &str)], replies: &[&str]) -> RuleSet {
        let raw: Vec<KeywordRule> = rules
            .iter()
            .map(|(p, r)| KeywordRule { pattern: p.to_string(), response: r.to_string() })
            .collect();
        RuleSet::new(
            Arc::new(rules::compile(&raw)),
            ResponseSet {
                question_replies: replies.iter().map(|r| r.to_string()).collect(),
                ..ResponseSet::default()
            },
        )
    }

    fn pair(question: &str, answer: &str) -> QaPair {
        QaPair { question: question.into(), answer: answer.into(), timestamp: 0 }
    }

    #[test]
    fn reply_is_captured_before_anything_else() {
        let c = classifier();
        let out = c.classify(
            &message("http://example.com nima?", Some("  Narxi QANCHA ")),
            &rule_set(&[("narx", "x")], &[]),
            &[pair("narx", "y")],
        );
        assert_eq!(
            out,
            Outcome::QaStore { question: "narxi qancha".into(), answer: "http://example.com nima?".into() }
        );
    }

    #[test]
    fn url_is_deleted_regardless_of_rules() {
        let c = classifier();
        let rules = rule_set(&[("example", "rule hit")], &[]);
        let pairs = [pair("example", "qa hit")];
        assert_eq!(c.classify(&message("http://example.com/x", None), &rules, &pairs), Outcome::Delete);
        assert_eq!(c.classify(&message("kanal: t.me/joinchat", None), &rules, &pairs), Outcome::Delete);
    }

    #[test]
    fn learned_answer_beats_rule() {
        let c = classifier();
        let out = c.classify(
            &message("Salom qalesiz", None),
            &rule_set(&[("salom", "rule")], &[]),
            &[pair("salom qalesiz", "yaxshi")],
        );
        assert_eq!(out, Outcome::QaReply("yaxshi".into()));
    }

    #[test]
    fn rule_reply_when_no_learned_answer() {
        let c = classifier();
        let out = c.classify(&message("NARXI qancha", None), &rule_set(&[("narx", "100")], &[]), &[]);
        assert_eq!(out, Outcome::RuleReply("100".into()));
    }

    #[test]
    fn question_without_replies_uses_default_fallback() {
        let c = classifier();
        let out = c.classify(&message("bu nima", None), &rule_set(&[], &[]), &[]);
        assert_eq!(out, Outcome::FallbackReply("Bilmadim 🤔".into()));
    }

    #[test]
    fn question_picks_from_configured_replies() {
        let c = classifier();
        let replies = ["bilmayman", "so'rab ko'ring"];
        for text in ["qachon?", "u kim", "ertaga kelasizmi"] {
            match c.classify(&message(text, None), &rule_set(&[], &replies), &[]) {
                Outcome::FallbackReply(r) => assert!(replies.contains(&r.as_str()), "{text}: {r}"),
                other => panic!("{text}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn statement_is_noop() {
        let c = classifier();
        assert_eq!(c.classify(&message("hammaga salom", None), &rule_set(&[], &[]), &[]), Outcome::NoOp);
        assert_eq!(c.classify(&message("   ", None), &rule_set(&[], &[]), &[pair("", "x")]), Outcome::NoOp);
    }

    #[test]
    fn every_outcome_has_a_distinct_label() {
        let labels = [
            Outcome::NoOp.label(),
            Outcome::Delete.label(),
            Outcome::QaStore { question: String::new(), answer: String::new() }.label(),
            Outcome::QaReply(String::new()).label(),
            Outcome::RuleReply(String::new()).label(),
            Outcome::FallbackReply(String::new()).label(),
        ];
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), labels.len());
    }
}
