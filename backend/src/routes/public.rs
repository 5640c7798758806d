use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any client may call, logged in or not. None of them reveals session data.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check.
        .route("/health", get(|| async { "ok" }))
        // POST /api/login
        // Credential submission, gated by the client's lockout.
        .route("/api/login", post(handlers::login))
        // GET /api/lockout
        // Remaining lock time for the login screen countdown.
        .route("/api/lockout", get(handlers::get_lockout))
        // GET /api/guard?path=...
        // Dry run of the route guard.
        .route("/api/guard", get(handlers::check_route))
}
