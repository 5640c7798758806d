use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes that require a logged-in session. The session middleware layered on by
/// `create_router` rejects with 401 before any handler here runs.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /api/logout
        .route("/api/logout", post(handlers::logout))
        // GET /api/session
        // The stored profile, role and display name.
        .route("/api/session", get(handlers::get_session))
        // GET /api/menu
        // Sidebar sections filtered by role.
        .route("/api/menu", get(handlers::get_menu))
}
