pub mod admin;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the RPC boundary router. The boundary is stateless — session
/// continuity travels as `session_id` inside tool arguments.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tools/list", get(tools::list_tools))
        .route("/tools/call", post(tools::call_tool))
        .route("/health", get(admin::health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
}
