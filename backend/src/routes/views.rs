use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Views Router Module
///
/// The login screen is the only view outside the guard. The CRUD screens (home, company
/// data, users, products, projects, variables, categories, orders) are resolved by the
/// fallback handler, which asks the route policy whether to render or redirect.
pub fn view_routes() -> Router<AppState> {
    Router::new()
        // GET /
        .route("/", get(handlers::login_view))
}
