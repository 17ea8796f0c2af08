//! Tool endpoints.
//!
//! - `GET /tools/list` — the catalog, for LLM function-calling setup
//! - `POST /tools/call` — generic dispatch; body `{name, arguments}`
//!
//! Tool failures are not HTTP failures: `/tools/call` answers 200 with
//! the uniform envelope either way. Transport-level errors (malformed
//! JSON) are the only 4xx paths.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let tools: Vec<_> = state
        .registry
        .list()
        .into_iter()
        .map(|d| {
            json!({
                "name": d.name,
                "description": d.description,
                "owning_agent": d.owning_agent,
                "input_schema": d.input_schema,
                "output_schema": d.output_schema,
                "side_effecting": d.side_effecting,
            })
        })
        .collect();
    Json(json!({ "tools": tools }))
}

#[derive(Debug, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

pub async fn call_tool(
    State(state): State<AppState>,
    Json(req): Json<CallToolRequest>,
) -> impl IntoResponse {
    let arguments = if req.arguments.is_null() {
        json!({})
    } else {
        req.arguments
    };
    let envelope = state.registry.call(&req.name, arguments).await;
    Json(envelope)
}
