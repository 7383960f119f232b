//! Axum handlers for the webhook routes.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use super::WebhookState;
use crate::subsystems::comms::update::parse_update;

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// GET /api/health
pub(super) async fn health(State(state): State<WebhookState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "bot": state.comms.bot_name() })),
    )
        .into_response()
}

/// GET {path}: registers the webhook on first call, then reports status.
pub(super) async fn status(State(state): State<WebhookState>) -> Response {
    state.comms.ensure_webhook().await;
    let report = state.comms.status().await;
    (StatusCode::OK, Json(report)).into_response()
}

/// POST {path}: exactly one Telegram update.
///
/// Malformed bodies are rejected with 400 before any state is touched.  Once
/// the update decodes, the reply is always 200 so Telegram does not redeliver.
pub(super) async fn update(State(state): State<WebhookState>, body: Bytes) -> Response {
    let event = match parse_update(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(channel_id = %state.channel_id, "rejecting update: {e}");
            return (StatusCode::BAD_REQUEST, json_error("bad_request", e)).into_response();
        }
    };

    let disposition = state.comms.dispatch(&state.channel_id, event).await;
    debug!(channel_id = %state.channel_id, ?disposition, "update processed");
    (StatusCode::OK, Json(json!({ "message": "OK" }))).into_response()
}
