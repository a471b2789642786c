use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Builds the router that exposes the progress-bus wire protocol (§6).
/// This is deliberately the whole of this crate's surface: no upload
/// routes, no job queue, no auth — those are out of scope (spec §1) and
/// owned by the surrounding API layer this crate is wired into.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/{document_id}", get(ws::ws_handler))
        .with_state(state)
}
