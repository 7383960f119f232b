//! End-to-end tests for the responder pipeline.
//!
//! Events are fed straight into [`Responder::handle`]; outbound traffic is
//! captured by a [`RecordingTransport`].
//!
//! Run with:
//!   cargo test --test test_responder

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use guruh_bot::config::{ResponderConfig, StoreBackend, StoreConfig};
use guruh_bot::subsystems::comms::transport::{OutboundCall, RecordingTransport};
use guruh_bot::subsystems::memory::PersistentStore;
use guruh_bot::subsystems::responder::activation::{AdminAllowList, STATE_KEY};
use guruh_bot::subsystems::responder::classifier::Outcome;
use guruh_bot::subsystems::responder::commands::{ACTIVATED, DEACTIVATED, DENIED};
use guruh_bot::subsystems::responder::event::{
    ConversationKind, InboundEvent, MediaKind, MediaMessage, MessageMeta, TextMessage,
};
use guruh_bot::subsystems::responder::qa::QA_KEY;
use guruh_bot::subsystems::responder::{Disposition, Responder};

const GROUP: i64 = -100_200;

// ── helpers ──────────────────────────────────────────────────────────────────

fn quiet_config() -> ResponderConfig {
    ResponderConfig { reaction_probability: 0.0, ..ResponderConfig::default() }
}

fn build(
    store: PersistentStore,
    config: &ResponderConfig,
    admins: AdminAllowList,
) -> (Responder, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let responder = Responder::new(store, transport.clone(), config, admins, Duration::from_secs(2))
        .with_seed(config, 2024);
    (responder, transport)
}

fn quiet() -> (Responder, Arc<RecordingTransport>, PersistentStore) {
    let store = PersistentStore::in_memory();
    let (r, t) = build(store.clone(), &quiet_config(), AdminAllowList::default());
    (r, t, store)
}

fn meta(message_id: i32, sender: &str) -> MessageMeta {
    MessageMeta {
        conversation_id: GROUP,
        conversation_kind: ConversationKind::Supergroup,
        message_id,
        sender_id: Some(sender.to_string()),
    }
}

fn say(message_id: i32, sender: &str, text: &str) -> InboundEvent {
    InboundEvent::Text(TextMessage { meta: meta(message_id, sender), text: text.into(), reply_to_text: None })
}

fn reply(message_id: i32, parent: &str, text: &str) -> InboundEvent {
    InboundEvent::Text(TextMessage {
        meta: meta(message_id, "7"),
        text: text.into(),
        reply_to_text: Some(parent.into()),
    })
}

fn photo(message_id: i32) -> InboundEvent {
    InboundEvent::Media(MediaMessage { meta: meta(message_id, "7"), kind: MediaKind::Photo })
}

fn reactions(t: &RecordingTransport) -> usize {
    t.calls().iter().filter(|c| matches!(c, OutboundCall::React { .. })).count()
}

// ── Q/A memory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn reply_is_captured_and_answers_later_questions() {
    let (r, t, _store) = quiet();

    let got = r.handle(reply(1, "  Kutubxona qayerda?  ", "Ikkinchi qavatda")).await;
    assert_eq!(
        got,
        Disposition::Classified(Outcome::QaStore {
            question: "kutubxona qayerda?".into(),
            answer: "Ikkinchi qavatda".into(),
        })
    );
    assert!(t.calls().is_empty(), "capturing a pair sends nothing");

    let pairs = r.qa().pairs().await;
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].question, "kutubxona qayerda?");

    // Stored question is a substring of the new message.
    let got = r.handle(say(2, "8", "Salom, KUTUBXONA QAYERDA? bilasizmi")).await;
    assert_eq!(got, Disposition::Classified(Outcome::QaReply("Ikkinchi qavatda".into())));
    assert_eq!(t.sent_texts(), vec!["Ikkinchi qavatda".to_string()]);
}

#[tokio::test]
async fn qa_match_beats_keyword_rule() {
    let (r, t, _store) = quiet();

    r.handle(say(1, "1", "/addrule narx => Narxlar saytda")).await;
    r.qa().store("narx qancha", "100 ming").await.unwrap();
    t.clear();

    let got = r.handle(say(2, "5", "narx qancha")).await;
    assert_eq!(got, Disposition::Classified(Outcome::QaReply("100 ming".into())));

    let got = r.handle(say(3, "5", "narx")).await;
    // "narx" is contained in the stored question, so memory still wins.
    assert_eq!(got, Disposition::Classified(Outcome::QaReply("100 ming".into())));

    let got = r.handle(say(4, "5", "yangi narxlar")).await;
    assert_eq!(got, Disposition::Classified(Outcome::RuleReply("Narxlar saytda".into())));
}

#[tokio::test]
async fn corrupt_qa_collection_is_repaired() {
    let (r, _t, store) = quiet();
    store.set(QA_KEY, "{ not json").await.unwrap();

    assert_eq!(r.qa().lookup("anything").await, None);
    assert_eq!(store.get(QA_KEY).await.as_deref(), Some("[]"));
}

// ── spam / exclusivity ───────────────────────────────────────────────────────

#[tokio::test]
async fn links_are_deleted_and_nothing_else_happens() {
    let (r, t, _store) = quiet();
    r.handle(say(1, "1", "/addrule example => Misol")).await;
    t.clear();

    let got = r.handle(say(8, "3", "http://example.com/x")).await;
    assert_eq!(got, Disposition::Classified(Outcome::Delete));

    t.clear();
    let got = r.handle(say(9, "3", "Arzon kurs: https://spam.example/offer nima?")).await;
    assert_eq!(got, Disposition::Classified(Outcome::Delete));
    assert_eq!(t.calls(), vec![OutboundCall::Delete { conversation_id: GROUP, message_id: 9 }]);

    t.clear();
    let got = r.handle(say(10, "3", "kanalga qo'shiling t.me/spamchannel")).await;
    assert_eq!(got, Disposition::Classified(Outcome::Delete));
    assert_eq!(t.calls().len(), 1);
}

#[tokio::test]
async fn each_message_has_at_most_one_effect() {
    let (r, t, _store) = quiet();
    r.handle(say(1, "1", "/addrule salom => Va alaykum assalom")).await;
    r.qa().store("dars qachon", "Soat 9 da").await.unwrap();

    let inputs = [
        "salom hammaga",
        "dars qachon",
        "https://x.example",
        "bugun havo qanday",
        "oddiy gap",
        "",
    ];
    for (i, text) in inputs.iter().enumerate() {
        t.clear();
        let before = r.qa().pairs().await.len();
        r.handle(say(100 + i as i32, "5", text)).await;
        let stored = r.qa().pairs().await.len() - before;
        assert!(t.calls().len() + stored <= 1, "more than one effect for {text:?}");
    }
}

#[tokio::test]
async fn plain_chatter_is_a_no_op() {
    let (r, t, _store) = quiet();
    let got = r.handle(say(1, "5", "bugun ajoyib kun")).await;
    assert_eq!(got, Disposition::Classified(Outcome::NoOp));
    assert!(t.calls().is_empty());
}

#[tokio::test]
async fn stored_fallback_replies_are_used_for_questions() {
    let (r, t, _store) = quiet();
    r.handle(say(1, "1", "/addreply Yaxshi savol!")).await;
    t.clear();

    let got = r.handle(say(2, "5", "bu kim")).await;
    assert_eq!(got, Disposition::Classified(Outcome::FallbackReply("Yaxshi savol!".into())));
}

// ── activation / allow-list ──────────────────────────────────────────────────

#[tokio::test]
async fn only_listed_admins_may_stop_and_start() {
    let store = PersistentStore::in_memory();
    let (r, t) = build(store, &quiet_config(), AdminAllowList::new(["42"]));

    r.handle(say(1, "99", "/stop")).await;
    assert_eq!(t.sent_texts(), vec![DENIED.to_string()]);
    assert!(r.activation().is_active().await);

    t.clear();
    r.handle(say(2, "42", "/stop")).await;
    assert_eq!(t.sent_texts(), vec![DEACTIVATED.to_string()]);
    assert!(!r.activation().is_active().await);

    t.clear();
    assert_eq!(r.handle(say(3, "5", "bu nima?")).await, Disposition::Ignored);
    assert!(t.calls().is_empty());

    // A non-admin /start while inactive only gets the greeting.
    r.handle(say(4, "99", "/start")).await;
    assert!(!r.activation().is_active().await);

    t.clear();
    r.handle(say(5, "42", "/start")).await;
    assert_eq!(t.sent_texts(), vec![ACTIVATED.to_string()]);
    assert!(r.activation().is_active().await);
}

#[tokio::test]
async fn commands_addressed_to_another_bot_are_ignored() {
    let config = ResponderConfig { bot_username: Some("guruh_bot".into()), ..quiet_config() };
    let (r, t) = build(PersistentStore::in_memory(), &config, AdminAllowList::default());

    let got = r.handle(say(1, "1", "/stop@other_bot")).await;
    assert!(matches!(got, Disposition::Classified(_)), "{got:?}");
    assert!(r.activation().is_active().await);
    assert!(!t.sent_texts().contains(&DEACTIVATED.to_string()));

    t.clear();
    assert_eq!(r.handle(say(2, "1", "/stop@guruh_bot")).await, Disposition::Command("stop"));
    assert_eq!(t.sent_texts(), vec![DEACTIVATED.to_string()]);
    assert!(!r.activation().is_active().await);
}

#[tokio::test]
async fn activation_survives_a_restart() {
    let dir = TempDir::new().expect("tempdir");
    let config = StoreConfig {
        backend: StoreBackend::JsonFile,
        legacy_dir: None,
        timeout: Duration::from_secs(2),
    };

    let store = PersistentStore::open(&config, dir.path()).expect("open store");
    let (r, _t) = build(store, &quiet_config(), AdminAllowList::default());
    r.handle(say(1, "1", "/stop")).await;
    drop(r);

    let reopened = PersistentStore::open(&config, dir.path()).expect("reopen store");
    assert!(reopened.get(STATE_KEY).await.is_some());
    let (r, t) = build(reopened, &quiet_config(), AdminAllowList::default());
    assert!(!r.activation().is_active().await);
    assert_eq!(r.handle(say(2, "5", "nima?")).await, Disposition::Ignored);
    assert!(t.calls().is_empty());
}

// ── reactions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reaction_rate_follows_probability() {
    let config = ResponderConfig { reaction_probability: 0.6, ..ResponderConfig::default() };
    let (r, t) = build(PersistentStore::in_memory(), &config, AdminAllowList::default());

    let trials = 2_000;
    for i in 0..trials {
        assert_eq!(r.handle(photo(i)).await, Disposition::Media);
    }
    let rate = reactions(&t) as f64 / trials as f64;
    assert!((rate - 0.6).abs() <= 0.05, "reaction rate {rate}");
}

#[tokio::test]
async fn reactions_off_disables_the_side_channel() {
    let config = ResponderConfig { reaction_probability: 1.0, ..ResponderConfig::default() };
    let (r, t) = build(PersistentStore::in_memory(), &config, AdminAllowList::default());

    r.handle(photo(1)).await;
    assert_eq!(reactions(&t), 1);

    r.handle(say(2, "1", "/reactions off")).await;
    t.clear();
    for i in 3..20 {
        r.handle(photo(i)).await;
    }
    assert_eq!(reactions(&t), 0);
    assert!(r.rules().responses().await.reactions.is_empty());
}

#[tokio::test]
async fn custom_glyphs_are_used() {
    let config = ResponderConfig { reaction_probability: 1.0, ..ResponderConfig::default() };
    let (r, t) = build(PersistentStore::in_memory(), &config, AdminAllowList::default());

    r.handle(say(1, "1", "/reactions 🔥")).await;
    t.clear();
    r.handle(photo(2)).await;
    assert_eq!(
        t.calls(),
        vec![OutboundCall::React { conversation_id: GROUP, message_id: 2, glyph: "🔥".into() }]
    );
}
