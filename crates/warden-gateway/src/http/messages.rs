//! Turn ingress, POST /api/messages
//!
//! Request:  platform activity JSON (`message` or `invoke`).
//! Response: `{"activities": [...], "invokeResponse"?: {"status", "body"}}`
//! Error:    `{"error": "...", "code": "..."}`

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::{debug, error};
use warden_channels::{BufferedChannel, Channel};
use warden_core::WardenError;

use crate::activity::Activity;
use crate::app::AppState;

pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<Activity>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let kind = activity.kind.clone();
    let Some(turn) = activity.into_turn() else {
        debug!(kind = %kind, "activity type not handled");
        return Ok(Json(json!({ "activities": [] })));
    };
    let request_id = turn.request_id.clone();

    let replies = Arc::new(BufferedChannel::new("http"));
    let channel: Arc<dyn Channel> = replies.clone();
    let report = state.processor.process(turn, channel).await.map_err(|e| {
        let err = WardenError::from(e);
        error!(request_id = %request_id, code = err.code(), error = %err, "turn failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string(), "code": err.code() })),
        )
    })?;

    let mut body = json!({ "activities": replies.close() });
    if let Some(invoke) = report.invoke_response {
        body["invokeResponse"] = json!(invoke);
    }
    Ok(Json(body))
}
