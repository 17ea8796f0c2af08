//! Health probe.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "agent_count": state.registry.agent_count(),
        "tool_count": state.registry.tool_count(),
    }))
}
