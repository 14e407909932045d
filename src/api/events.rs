/// Completion event intake endpoints
///
/// External parties complete callback and webhook steps through these
/// routes. The intake raises the matching event on the hub; delivery is
/// at-least-once on the caller's side, so an unmatched event (nobody
/// waiting) is acknowledged with matched=false rather than an error.

use crate::api::AppState;
use crate::runtime::events::{callback_key, webhook_key, StepEvent};
use crate::workflow::types::SubStep;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Body of a completion event
#[derive(Debug, Deserialize, Default)]
pub struct EventRequest {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    /// Action name, resolved by webhook steps against their
    /// action_sub_steps map
    #[serde(default)]
    pub action: Option<String>,
    /// Explicit successor override for the completing step
    #[serde(default)]
    pub sub_steps: Option<Vec<SubStep>>,
}

fn default_success() -> bool {
    true
}

impl From<EventRequest> for StepEvent {
    fn from(request: EventRequest) -> Self {
        StepEvent {
            success: request.success,
            status_code: request.status_code,
            message: request.message,
            action: request.action,
            sub_steps: request.sub_steps,
        }
    }
}

/// Create completion event intake routes
pub fn create_event_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/events/callback/{action}/{instance_id}",
            post(callback_event),
        )
        .route(
            "/api/events/webhook/{webhook_id}/{step_key}",
            post(webhook_event),
        )
}

/// Complete a callback step
///
/// POST /api/events/callback/:action/:instance_id
/// Body: { "success": true, "status_code": 200 }
async fn callback_event(
    State(state): State<AppState>,
    Path((action, instance_id)): Path<(String, String)>,
    Json(request): Json<EventRequest>,
) -> Json<Value> {
    let key = callback_key(&action, &instance_id);
    let matched = state.events.raise(&key, request.into()).await;

    tracing::info!(
        "Callback event '{}' for instance '{}' (matched: {})",
        action,
        instance_id,
        matched
    );
    Json(json!({ "matched": matched }))
}

/// Complete a webhook step
///
/// POST /api/events/webhook/:webhook_id/:step_key
/// Body: { "success": true, "action": "approved" }
///
/// `step_key` is `{run_id}:{step_number}`, handed to the external party
/// in the original callout.
async fn webhook_event(
    State(state): State<AppState>,
    Path((webhook_id, step_key)): Path<(String, String)>,
    Json(request): Json<EventRequest>,
) -> Json<Value> {
    let key = webhook_key(&webhook_id, &step_key);
    let matched = state.events.raise(&key, request.into()).await;

    tracing::info!(
        "Webhook event '{}' for step '{}' (matched: {})",
        webhook_id,
        step_key,
        matched
    );
    Json(json!({ "matched": matched }))
}
