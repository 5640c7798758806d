use crate::{
    AppState,
    auth::{AuthUser, ClientContext},
    error::LoginError,
    lockout::{LockoutCountdown, minutes_remaining, remaining_lockout_ms},
    login::attempt_login,
    menu::{home_tiles, role_label, visible_menu},
    models::{
        GuardDecision, GuardQuery, LockoutStatus, LoginRequest, LoginResponse, MenuView,
        SessionInfo, ViewResponse,
    },
    policy::{GuardInput, LOGIN_ROUTE, navigation_visible},
    session::{clear_session, display_name},
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use std::collections::BTreeMap;
use std::time::Duration;

// --- Public Handlers ---

/// login
///
/// [Public Route] Submits credentials on behalf of a client.
///
/// *Lockout*: a locked client is answered with 429 before the auth API is contacted. The
/// failure that reaches the limit arms a countdown which clears the lock when it lapses.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Inactive user"),
        (status = 422, description = "Invalid form"),
        (status = 429, description = "Locked"),
        (status = 502, description = "Auth API unreachable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, LoginError> {
    let limiter = state.limiter(&client.stores);

    match attempt_login(state.gateway.as_ref(), &client.stores, &limiter, payload).await {
        Ok(success) => {
            if let Some(id) = client.id {
                state.countdowns.disarm(id);
            }
            Ok(Json(LoginResponse {
                profile: success.profile,
                redirect_to: success.redirect_to,
            }))
        }
        Err(err @ LoginError::LockedOut { .. }) => {
            if let Some(id) = client.id {
                let tick = Duration::from_millis(state.config.lockout_tick_ms);
                state
                    .countdowns
                    .arm(id, LockoutCountdown::start(limiter, tick));
            }
            Err(err)
        }
        Err(err) => {
            // A rejection that recorded nothing leaves no state behind.
            if let Some(id) = client.id {
                state.stores.release_if_empty(id);
            }
            Err(err)
        }
    }
}

/// get_lockout
///
/// [Public Route] Current lockout of the calling client, recomputed from the persisted
/// record. Drives the countdown shown on the login screen.
#[utoipa::path(
    get,
    path = "/api/lockout",
    responses((status = 200, description = "Lockout status", body = LockoutStatus))
)]
pub async fn get_lockout(State(state): State<AppState>, headers: HeaderMap) -> Json<LockoutStatus> {
    let client = ClientContext::resolve_or_guest(&headers, &state.stores);
    let limiter = state.limiter(&client.stores);

    let lockout = limiter.refresh();
    let remaining_ms = remaining_lockout_ms(&lockout, limiter.now());
    // An expired lock was just cleared; the client may have nothing left to keep.
    if let Some(id) = client.id {
        state.stores.release_if_empty(id);
    }

    Json(LockoutStatus {
        locked: remaining_ms > 0,
        failed_attempts: lockout.failed_attempts,
        max_attempts: limiter.settings().max_attempts,
        remaining_ms,
        remaining_minutes: minutes_remaining(remaining_ms),
    })
}

/// check_route
///
/// [Public Route] Asks the guard what would happen on navigating to `path`, without
/// navigating.
#[utoipa::path(
    get,
    path = "/api/guard",
    params(GuardQuery),
    responses((status = 200, description = "Guard decision", body = GuardDecision))
)]
pub async fn check_route(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GuardQuery>,
) -> Json<GuardDecision> {
    let client = ClientContext::resolve_or_guest(&headers, &state.stores);
    Json(decide_for(&state, &client, &query.path))
}

// --- Authenticated Handlers ---

/// logout
///
/// [Authenticated Route] Destroys the session. The lockout record is kept; a client left
/// with nothing stored is unregistered.
#[utoipa::path(
    post,
    path = "/api/logout",
    responses((status = 204, description = "Logged out"), (status = 401, description = "No session"))
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser { client, .. }: AuthUser,
) -> StatusCode {
    clear_session(client.stores.session.as_ref());
    let released = client
        .id
        .is_some_and(|id| state.stores.release_if_empty(id));
    tracing::info!(released, "session cleared");
    StatusCode::NO_CONTENT
}

/// get_session
///
/// [Authenticated Route] The logged-in profile and its role.
#[utoipa::path(
    get,
    path = "/api/session",
    responses((status = 200, description = "Session", body = SessionInfo), (status = 401, description = "No session"))
)]
pub async fn get_session(AuthUser { profile, role, .. }: AuthUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        authenticated: true,
        role,
        display_name: display_name(profile.as_ref()),
        profile,
    })
}

/// get_menu
///
/// [Authenticated Route] Sidebar header and the menu sections the role may see.
#[utoipa::path(
    get,
    path = "/api/menu",
    responses((status = 200, description = "Menu", body = MenuView), (status = 401, description = "No session"))
)]
pub async fn get_menu(AuthUser { profile, role, .. }: AuthUser) -> Json<MenuView> {
    Json(MenuView {
        display_name: display_name(profile.as_ref()),
        role_label: role_label(role).to_string(),
        sections: visible_menu(role),
        home_tiles: home_tiles(role),
    })
}

// --- Views ---

/// login_view
///
/// [View] The login screen. A client that is already logged in is sent home instead.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Login view", body = ViewResponse),
        (status = 303, description = "Already logged in")
    )
)]
pub async fn login_view(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let client = ClientContext::resolve_or_guest(&headers, &state.stores);
    if client.session().is_authenticated() {
        return Redirect::to(state.policy.home()).into_response();
    }

    Json(ViewResponse {
        view: "login".to_string(),
        path: LOGIN_ROUTE.to_string(),
        params: BTreeMap::new(),
        navigation: navigation_visible(LOGIN_ROUTE),
    })
    .into_response()
}

/// render_view
///
/// [View] Every other path. The guard either lets the view render (JSON descriptor of the
/// screen) or redirects with 303. Unknown and forbidden paths are never an error page.
pub async fn render_view(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let path = uri.path();
    let client = ClientContext::resolve_or_guest(&headers, &state.stores);

    match decide_for(&state, &client, path) {
        GuardDecision::Render { view, params } => Json(ViewResponse {
            view,
            path: path.to_string(),
            params,
            navigation: navigation_visible(path),
        })
        .into_response(),
        GuardDecision::Redirect { to } => Redirect::to(&to).into_response(),
    }
}

fn decide_for(state: &AppState, client: &ClientContext, path: &str) -> GuardDecision {
    let reader = client.session();
    let input = GuardInput {
        path,
        authenticated: reader.is_authenticated(),
        role: reader.role(),
    };
    let decision = state.policy.decide(&input);

    if let Some(to) = decision.redirect_to() {
        tracing::debug!(
            path,
            redirect_to = to,
            authenticated = input.authenticated,
            role = input.role.as_str(),
            "navigation redirected"
        );
    }
    decision
}
