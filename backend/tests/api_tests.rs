use axum::{Json, Router, http::StatusCode, routing::post};
use intranet_portal::{
    AppConfig, AppState, MockAuthGateway, StoreState, create_router,
    gateway::AuthGatewayState,
    models::{LoginResponse, Role, UpstreamLoginResponse, UserProfile, ViewResponse},
};
use reqwest::{Client, Response, redirect::Policy};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// --- Setup ---

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub stores: StoreState,
}

async fn spawn_app(gateway: AuthGatewayState) -> TestApp {
    let state = AppState::new(AppConfig::default(), gateway);
    let stores = state.stores.clone();
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Redirects are asserted on, never followed.
    let client = Client::builder().redirect(Policy::none()).build().unwrap();

    TestApp {
        address,
        client,
        stores,
    }
}

impl TestApp {
    async fn get(&self, path: &str, client_id: Option<Uuid>) -> Response {
        let mut request = self.client.get(format!("{}{}", self.address, path));
        if let Some(id) = client_id {
            request = request.header("x-client-id", id.to_string());
        }
        request.send().await.expect("req fail")
    }

    async fn login(&self, client_id: Uuid, username: &str, password: &str) -> Response {
        self.client
            .post(format!("{}/api/login", self.address))
            .header("x-client-id", client_id.to_string())
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("req fail")
    }
}

fn upstream(role: Role) -> UpstreamLoginResponse {
    UpstreamLoginResponse {
        usuario: UserProfile {
            dni: "12345678".to_string(),
            username: "jperez".to_string(),
            nombre: "Juan".to_string(),
            email: "juan@example.com".to_string(),
            role,
            is_active: true,
            ..Default::default()
        },
        access: "a-token".to_string(),
        refresh: "r-token".to_string(),
    }
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

// --- Public Surface ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;
    let response = app.get("/health", None).await;
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_login_view_for_guest() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;

    let response = app.get("/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: ViewResponse = response.json().await.unwrap();
    assert_eq!(view.view, "login");
    assert!(!view.navigation);
}

#[tokio::test]
async fn test_guest_navigation_is_redirected() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;

    let response = app.get("/home", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let response = app.get("/unknown-path", Some(Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/home");
}

#[tokio::test]
async fn test_login_requires_client_id() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;

    let response = app
        .client
        .post(format!("{}/api/login", app.address))
        .json(&json!({ "username": "jperez", "password": "password1" }))
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_CLIENT_ID");
}

#[tokio::test]
async fn test_session_endpoints_require_login() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;

    for path in ["/api/session", "/api/menu"] {
        let response = app.get(path, Some(Uuid::new_v4())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "path {path}");
    }
}

#[tokio::test]
async fn test_non_get_navigation_not_allowed() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;
    let response = app
        .client
        .post(format!("{}/home", app.address))
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- Client Registration ---

#[tokio::test]
async fn test_read_only_requests_do_not_register_clients() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;

    for path in ["/home", "/", "/api/lockout", "/api/guard?path=/home", "/api/session"] {
        let id = Uuid::new_v4();
        app.get(path, Some(id)).await;
        assert!(!app.stores.contains(id), "path {path}");
    }
    assert!(app.stores.is_empty());
}

#[tokio::test]
async fn test_login_that_records_nothing_leaves_no_client() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;
    let id = Uuid::new_v4();

    let response = app.login(id, "bad name", "short").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(!app.stores.contains(id));

    // A counted failure is state worth keeping.
    let response = app.login(id, "jperez", "wrongpass").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.stores.contains(id));
}

#[tokio::test]
async fn test_logout_unregisters_client_without_lockout_record() {
    let app = spawn_app(Arc::new(MockAuthGateway::accepting(upstream(Role::Default)))).await;
    let id = Uuid::new_v4();

    assert_eq!(app.login(id, "jperez", "password1").await.status(), StatusCode::OK);
    assert!(app.stores.contains(id));

    let response = app
        .client
        .post(format!("{}/api/logout", app.address))
        .header("x-client-id", id.to_string())
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.stores.contains(id));
}

// --- Session Lifecycle ---

#[tokio::test]
async fn test_admin_session_lifecycle() {
    let app = spawn_app(Arc::new(MockAuthGateway::accepting(upstream(Role::Admin)))).await;
    let id = Uuid::new_v4();

    // 1. Login
    let response = app.login(id, "jperez", "password1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LoginResponse = response.json().await.unwrap();
    assert_eq!(body.redirect_to, "/home");
    assert_eq!(body.profile.role, Role::Admin);

    // 2. Guarded views render
    let response = app.get("/home", Some(id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: ViewResponse = response.json().await.unwrap();
    assert_eq!(view.view, "home");
    assert!(view.navigation);

    let response = app.get("/projects/edit/7", Some(id)).await;
    let view: ViewResponse = response.json().await.unwrap();
    assert_eq!(view.view, "edit_project");
    assert_eq!(view.params.get("id").map(String::as_str), Some("7"));

    let response = app.get("/generals", Some(id)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // 3. Login screen bounces a logged-in client
    let response = app.get("/", Some(id)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/home");

    // 4. Session and menu
    let session: Value = app.get("/api/session", Some(id)).await.json().await.unwrap();
    assert_eq!(session["role"], "admin");
    assert_eq!(session["display_name"], "Juan");

    let menu: Value = app.get("/api/menu", Some(id)).await.json().await.unwrap();
    assert_eq!(menu["role_label"], "Administrator");
    assert_eq!(menu["home_tiles"].as_array().unwrap().len(), 7);

    // 5. Logout
    let response = app
        .client
        .post(format!("{}/api/logout", app.address))
        .header("x-client-id", id.to_string())
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get("/home", Some(id)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_default_role_kept_out_of_admin_views() {
    let app = spawn_app(Arc::new(MockAuthGateway::accepting(upstream(Role::Default)))).await;
    let id = Uuid::new_v4();
    assert_eq!(app.login(id, "jperez", "password1").await.status(), StatusCode::OK);

    let response = app.get("/generals", Some(id)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/home");

    let decision: Value = app
        .get("/api/guard?path=/users", Some(id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decision, json!({ "decision": "redirect", "to": "/home" }));

    let decision: Value = app
        .get("/api/guard?path=/products", Some(id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decision["decision"], "render");
    assert_eq!(decision["view"], "products");

    let menu: Value = app.get("/api/menu", Some(id)).await.json().await.unwrap();
    assert_eq!(menu["role_label"], "User");
    assert_eq!(menu["home_tiles"].as_array().unwrap().len(), 5);
}

// --- Lockout ---

#[tokio::test]
async fn test_lockout_over_http() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;
    let id = Uuid::new_v4();

    for _ in 0..2 {
        let response = app.login(id, "jperez", "wrongpass").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.login(id, "jperez", "wrongpass").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOO_MANY_ATTEMPTS");

    let response = app.login(id, "jperez", "password1").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ACCOUNT_LOCKED");
    assert_eq!(body["message"], "Account locked. Try again in 10 minutes.");

    let status: Value = app.get("/api/lockout", Some(id)).await.json().await.unwrap();
    assert_eq!(status["locked"], true);
    assert_eq!(status["failed_attempts"], 3);
    assert_eq!(status["remaining_minutes"], 10);

    // Another client is unaffected.
    let status: Value = app
        .get("/api/lockout", Some(Uuid::new_v4()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["locked"], false);
    assert_eq!(status["failed_attempts"], 0);
}

#[tokio::test]
async fn test_validation_errors_listed_per_field() {
    let app = spawn_app(Arc::new(MockAuthGateway::rejecting(401))).await;

    let response = app.login(Uuid::new_v4(), "bad name", "short").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["field_errors"]["username"].is_string());
    assert!(body["field_errors"]["password"].is_string());
}

// --- Upstream Gateway ---

async fn spawn_auth_api() -> String {
    async fn login(Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
        if body["username"] == "jperez" && body["password"] == "password1" {
            Ok(Json(json!({
                "usuario": { "username": "jperez", "nombre": "Juan", "role": "admin", "is_active": true },
                "access": "a-token",
                "refresh": "r-token"
            })))
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }

    let router = Router::new().route("/api/auth/login", post(login));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://127.0.0.1:{}/api/auth/", port)
}

#[tokio::test]
async fn test_http_gateway_end_to_end() {
    use intranet_portal::HttpAuthGateway;

    let base = spawn_auth_api().await;
    let gateway = HttpAuthGateway::new(&base);
    assert!(gateway.login_url().ends_with("/api/auth/login"));

    let app = spawn_app(Arc::new(gateway)).await;
    let id = Uuid::new_v4();

    let response = app.login(id, "jperez", "wrongpass").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Invalid username or password. Attempt 1 of 3.");

    let response = app.login(id, "jperez", "password1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: LoginResponse = response.json().await.unwrap();
    assert_eq!(body.profile.role, Role::Admin);

    let status: Value = app.get("/api/lockout", Some(id)).await.json().await.unwrap();
    assert_eq!(status["failed_attempts"], 0);
}

#[tokio::test]
async fn test_unreachable_auth_api_is_bad_gateway() {
    use intranet_portal::HttpAuthGateway;

    // Nothing listens on port 1.
    let app = spawn_app(Arc::new(HttpAuthGateway::new("http://127.0.0.1:1/api/auth"))).await;
    let id = Uuid::new_v4();

    let response = app.login(id, "jperez", "password1").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Error logging in");

    let status: Value = app.get("/api/lockout", Some(id)).await.json().await.unwrap();
    assert_eq!(status["failed_attempts"], 0);
}
