//! Integration tests for the webhook router.
//!
//! Requests go through `tower::ServiceExt::oneshot`; no socket is bound.
//!
//! Run with:
//!   cargo test --test test_webhook

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use guruh_bot::config::ResponderConfig;
use guruh_bot::subsystems::comms::CommsState;
use guruh_bot::subsystems::comms::transport::{OutboundCall, RecordingTransport};
use guruh_bot::subsystems::comms::webhook::{WebhookState, build_router};
use guruh_bot::subsystems::memory::PersistentStore;
use guruh_bot::subsystems::responder::Responder;
use guruh_bot::subsystems::responder::activation::AdminAllowList;

const PATH: &str = "/api/telegram";

// ── helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    router: Router,
    transport: Arc<RecordingTransport>,
    responder: Arc<Responder>,
}

fn harness(public_url: Option<&str>) -> Harness {
    let config = ResponderConfig { reaction_probability: 0.0, ..ResponderConfig::default() };
    let transport = Arc::new(RecordingTransport::new());
    let responder = Arc::new(
        Responder::new(
            PersistentStore::in_memory(),
            transport.clone(),
            &config,
            AdminAllowList::default(),
            Duration::from_secs(2),
        )
        .with_seed(&config, 5),
    );
    // Receiver dropped on purpose: events are best-effort.
    let (event_tx, _event_rx) = mpsc::channel(64);
    let comms = Arc::new(CommsState::new(
        "guruh-test",
        responder.clone(),
        event_tx,
        public_url.map(|base| format!("{base}{PATH}")),
    ));
    let router = build_router(PATH, WebhookState::new("webhook-test", comms));
    Harness { router, transport, responder }
}

async fn send(router: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

fn group_text(message_id: i64, text: &str) -> Body {
    Body::from(
        json!({
            "update_id": 9000 + message_id,
            "message": {
                "message_id": message_id,
                "chat": { "id": -100_777, "type": "supergroup" },
                "from": { "id": 42, "is_bot": false, "first_name": "Ali" },
                "date": 1_700_000_000,
                "text": text,
            }
        })
        .to_string(),
    )
}

// ── POST ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_update_is_acknowledged_and_answered() {
    let h = harness(None);
    let (status, body) = send(&h.router, Method::POST, PATH, group_text(1, "bu nima?")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "OK" }));
    assert_eq!(h.transport.sent_texts(), vec!["Bilmadim 🤔".to_string()]);
}

#[tokio::test]
async fn spam_update_is_deleted() {
    let h = harness(None);
    let (status, _) =
        send(&h.router, Method::POST, PATH, group_text(3, "https://casino.example")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        h.transport.calls(),
        vec![OutboundCall::Delete { conversation_id: -100_777, message_id: 3 }]
    );
}

#[tokio::test]
async fn non_message_update_is_acknowledged() {
    let h = harness(None);
    let body = Body::from(json!({ "update_id": 1, "edited_message": {} }).to_string());
    let (status, body) = send(&h.router, Method::POST, PATH, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OK");
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let h = harness(None);
    let (status, body) = send(&h.router, Method::POST, PATH, Body::from("{\"update_id\":")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert!(h.transport.calls().is_empty());
    assert!(h.responder.qa().pairs().await.is_empty());
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let h = harness(None);
    let (status, _) = send(&h.router, Method::POST, PATH, Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.transport.calls().is_empty());
}

// ── GET ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_registers_webhook_once() {
    let h = harness(Some("https://bot.example"));

    let (status, body) = send(&h.router, Method::GET, PATH, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bot_active"], true);
    assert_eq!(body["reactions_count"], 10);
    assert_eq!(body["webhook_registered"], true);
    assert_eq!(body["message"], "Webhook set to https://bot.example/api/telegram");

    send(&h.router, Method::GET, PATH, Body::empty()).await;
    assert_eq!(
        h.transport.calls(),
        vec![OutboundCall::RegisterWebhook { url: "https://bot.example/api/telegram".into() }]
    );
}

#[tokio::test]
async fn status_reflects_commands() {
    let h = harness(None);
    send(&h.router, Method::POST, PATH, group_text(1, "/reactions off")).await;
    send(&h.router, Method::POST, PATH, group_text(2, "/stop")).await;

    let (_, body) = send(&h.router, Method::GET, PATH, Body::empty()).await;
    assert_eq!(body["bot_active"], false);
    assert_eq!(body["reactions_count"], 0);
    assert_eq!(body["webhook_registered"], false);
    assert!(h.transport.calls().iter().all(|c| !matches!(c, OutboundCall::RegisterWebhook { .. })));
}

#[tokio::test]
async fn health_reports_bot_name() {
    let h = harness(None);
    let (status, body) = send(&h.router, Method::GET, "/api/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "bot": "guruh-test" }));
}
