use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod lockout;
pub mod login;
pub mod menu;
pub mod models;
pub mod policy;
pub mod sanitizer;
pub mod session;
pub mod store;

// Routing segregation (Public, Authenticated, Views).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public, views};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use gateway::{AuthGatewayState, HttpAuthGateway, MockAuthGateway};
pub use lockout::{ClockState, CountdownRegistry, CountdownState, LoginLimiter, SystemClock};
pub use policy::RoutePolicy;
pub use store::{ClientStores, StoreRegistry, StoreState};

/// ApiDoc
///
/// Aggregates every documented path and schema into the OpenAPI document served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_lockout, handlers::check_route, handlers::logout,
        handlers::get_session, handlers::get_menu, handlers::login_view
    ),
    components(
        schemas(
            models::Role, models::UserProfile, models::LoginRequest, models::LoginResponse,
            models::SessionInfo, models::LockoutStatus, models::GuardDecision,
            models::ViewResponse, models::MenuView, models::MenuSection, models::MenuItem,
        )
    ),
    tags(
        (name = "intranet-portal", description = "Back office access gateway")
    )
)]
struct ApiDoc;

/// PolicyState
///
/// The route guard, shared read-only.
pub type PolicyState = Arc<RoutePolicy>;

/// AppState
///
/// The single, cloneable container of every service a handler may need.
#[derive(Clone)]
pub struct AppState {
    /// Per-client session and lockout stores.
    pub stores: StoreState,
    /// Running lockout countdowns, one per locked client.
    pub countdowns: CountdownState,
    /// Upstream authentication API.
    pub gateway: AuthGatewayState,
    /// Route access guard.
    pub policy: PolicyState,
    /// Time source for the lockout.
    pub clock: ClockState,
    pub config: AppConfig,
}

impl AppState {
    /// Assembles a state with fresh stores, the standard route policy and the system clock.
    pub fn new(config: AppConfig, gateway: AuthGatewayState) -> Self {
        Self {
            stores: Arc::new(StoreRegistry::new()),
            countdowns: Arc::new(CountdownRegistry::new()),
            gateway,
            policy: Arc::new(RoutePolicy::standard()),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// The login limiter bound to a client's longer-lived store.
    pub fn limiter(&self, stores: &ClientStores) -> LoginLimiter {
        LoginLimiter::new(stores.local.clone(), self.clock.clone(), self.config.lockout)
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for StoreState {
    fn from_ref(app_state: &AppState) -> StoreState {
        app_state.stores.clone()
    }
}

impl FromRef<AppState> for AuthGatewayState {
    fn from_ref(app_state: &AppState) -> AuthGatewayState {
        app_state.gateway.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// session_middleware
///
/// Enforces a logged-in session on the `authenticated_routes`. `AuthUser` rejects with 401
/// before the handler runs when the client has no session.
async fn session_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            )),
        )
        .merge(views::view_routes())
        // Every other path is a navigation the guard decides on.
        .fallback(handlers::render_view)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the request id so every log line of one request
/// can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
