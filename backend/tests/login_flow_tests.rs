use intranet_portal::{
    error::LoginError,
    gateway::MockAuthGateway,
    lockout::{LockoutSettings, LoginLimiter, ManualClock},
    login::{attempt_login, validate_credentials},
    models::{LoginRequest, Role, UpstreamLoginResponse, UserProfile},
    session::SessionReader,
    store::{ClientStores, KeyValueStore, MemoryStore, StoreOp},
};
use parking_lot::Mutex;
use std::sync::Arc;

const START: i64 = 1_700_000_000_000;

// --- Helpers ---

struct Client {
    stores: ClientStores,
    limiter: LoginLimiter,
    clock: Arc<ManualClock>,
}

fn client() -> Client {
    let stores = ClientStores::ephemeral();
    let clock = Arc::new(ManualClock::new(START));
    let limiter = LoginLimiter::new(
        stores.local.clone(),
        clock.clone(),
        LockoutSettings::default(),
    );
    Client {
        stores,
        limiter,
        clock,
    }
}

fn request(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn accepted(is_active: bool, role: Role) -> UpstreamLoginResponse {
    UpstreamLoginResponse {
        usuario: UserProfile {
            dni: "12345678".to_string(),
            username: "jperez".to_string(),
            nombre: "Juan".to_string(),
            role,
            is_active,
            ..Default::default()
        },
        access: "a-token".to_string(),
        refresh: "r-token".to_string(),
    }
}

async fn submit(
    gateway: &MockAuthGateway,
    client: &Client,
    req: LoginRequest,
) -> Result<(), LoginError> {
    attempt_login(gateway, &client.stores, &client.limiter, req)
        .await
        .map(|_| ())
}

// --- Validation ---

#[test]
fn test_validation_rules() {
    assert!(validate_credentials("jperez", "password1").is_ok());

    let long_username = "a".repeat(51);
    let long_password = "p".repeat(101);
    let cases = [
        ("", "password1", "username"),
        ("j perez", "password1", "username"),
        (long_username.as_str(), "password1", "username"),
        ("jperez", "", "password"),
        ("jperez", "short", "password"),
        ("jperez", long_password.as_str(), "password"),
    ];
    for (username, password, field) in cases {
        match validate_credentials(username, password) {
            Err(LoginError::Validation { field_errors }) => {
                assert!(field_errors.contains_key(field), "{username:?}/{password:?}");
                assert_eq!(field_errors.len(), 1);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_invalid_form_never_reaches_gateway() {
    let gateway = MockAuthGateway::rejecting(401);
    let client = client();

    let err = submit(&gateway, &client, request("", "x")).await.unwrap_err();
    match err {
        err @ LoginError::Validation { .. } => assert_eq!(err.status_code().as_u16(), 422),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(gateway.calls(), 0);
    assert_eq!(client.limiter.state().failed_attempts, 0);
}

// --- Outcomes ---

#[tokio::test]
async fn test_success_establishes_session_and_clears_counter() {
    let gateway = MockAuthGateway::accepting(accepted(true, Role::Admin));
    let client = client();
    client.limiter.record_failure();

    let success = attempt_login(
        &gateway,
        &client.stores,
        &client.limiter,
        request("jperez", "password1"),
    )
    .await
    .unwrap();

    assert_eq!(success.redirect_to, "/home");
    assert_eq!(success.profile.role, Role::Admin);
    assert_eq!(client.limiter.state().failed_attempts, 0);

    let reader = SessionReader::new(client.stores.session.as_ref());
    assert!(reader.is_authenticated());
    assert_eq!(reader.role(), Role::Admin);
    assert_eq!(reader.access_token().as_deref(), Some("a-token"));
}

#[tokio::test]
async fn test_rejections_count_then_lock() {
    let gateway = MockAuthGateway::rejecting(401);
    let client = client();

    for attempt in 1..=2 {
        let err = submit(&gateway, &client, request("jperez", "wrongpass")).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid username or password. Attempt {attempt} of 3.")
        );
    }

    let err = submit(&gateway, &client, request("jperez", "wrongpass")).await.unwrap_err();
    assert!(matches!(err, LoginError::LockedOut { minutes: 10 }));
    assert_eq!(
        err.to_string(),
        "Too many failed attempts. Account locked for 10 minutes."
    );
    assert_eq!(gateway.calls(), 3);
}

#[tokio::test]
async fn test_locked_client_never_reaches_gateway() {
    let gateway = MockAuthGateway::rejecting(401);
    let client = client();
    for _ in 0..3 {
        let _ = submit(&gateway, &client, request("jperez", "wrongpass")).await;
    }
    assert_eq!(gateway.calls(), 3);

    client.clock.advance(4 * 60_000 + 1);
    let err = submit(&gateway, &client, request("jperez", "rightpass")).await.unwrap_err();

    // 5:59.999 left, shown as 6 minutes.
    assert_eq!(err.to_string(), "Account locked. Try again in 6 minutes.");
    assert_eq!(gateway.calls(), 3);
    assert_eq!(client.limiter.state().failed_attempts, 3);
}

#[tokio::test]
async fn test_login_allowed_again_after_lock_expires() {
    let rejecting = MockAuthGateway::rejecting(401);
    let client = client();
    for _ in 0..3 {
        let _ = submit(&rejecting, &client, request("jperez", "wrongpass")).await;
    }

    client.clock.advance(10 * 60_000);
    let accepting = MockAuthGateway::accepting(accepted(true, Role::Default));
    assert!(submit(&accepting, &client, request("jperez", "rightpass")).await.is_ok());
    assert_eq!(accepting.calls(), 1);
}

#[tokio::test]
async fn test_inactive_user_refused_without_counting() {
    let gateway = MockAuthGateway::accepting(accepted(false, Role::Admin));
    let client = client();
    client.limiter.record_failure();

    let err = submit(&gateway, &client, request("jperez", "password1")).await.unwrap_err();
    assert!(matches!(err, LoginError::Inactive));
    assert_eq!(err.status_code().as_u16(), 403);

    // Neither counted nor reset.
    assert_eq!(client.limiter.state().failed_attempts, 1);
    assert!(!SessionReader::new(client.stores.session.as_ref()).is_authenticated());
}

#[tokio::test]
async fn test_transport_failure_leaves_lockout_untouched() {
    let gateway = MockAuthGateway::failing();
    let client = client();
    client.limiter.record_failure();

    let err = submit(&gateway, &client, request("jperez", "password1")).await.unwrap_err();
    assert!(matches!(err, LoginError::Upstream(_)));
    assert_eq!(err.to_string(), "Error logging in");
    assert_eq!(client.limiter.state().failed_attempts, 1);
    assert!(client.stores.session.get("user-info").is_none());
}

// --- Forwarded Credentials ---

#[tokio::test]
async fn test_username_sanitized_password_forwarded_verbatim() {
    let gateway = MockAuthGateway::accepting(accepted(true, Role::Default));
    let client = client();

    submit(&gateway, &client, request("  jperez  ", "  p<a>ss w0rd ")).await.unwrap();

    let forwarded = gateway.last_request().unwrap();
    assert_eq!(forwarded.username, "jperez");
    assert_eq!(forwarded.password, "  p<a>ss w0rd ");
}

#[tokio::test]
async fn test_markup_in_username_is_a_validation_error() {
    let gateway = MockAuthGateway::accepting(accepted(true, Role::Default));
    let client = client();

    // Sanitized to "&lt; admin", which the username rule refuses.
    let err = submit(&gateway, &client, request("< admin", "password1")).await.unwrap_err();
    assert!(matches!(err, LoginError::Validation { .. }));
    assert_eq!(gateway.calls(), 0);
}

// --- Write Ordering ---

/// A store that logs every batched write into a journal shared by several stores.
struct JournalStore {
    inner: MemoryStore,
    journal: Arc<Mutex<Vec<String>>>,
}

fn journal_entry(op: &StoreOp) -> String {
    match op {
        StoreOp::Set(key, _) => format!("set:{key}"),
        StoreOp::Remove(key) => format!("remove:{key}"),
    }
}

impl JournalStore {
    fn log(&self, batch: &[StoreOp]) {
        self.journal.lock().extend(batch.iter().map(journal_entry));
    }
}

impl KeyValueStore for JournalStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: String) {
        self.log(&[StoreOp::set(key, value.clone())]);
        self.inner.set(key, value);
    }

    fn remove(&self, key: &str) {
        self.log(&[StoreOp::remove(key)]);
        self.inner.remove(key);
    }

    fn apply(&self, batch: Vec<StoreOp>) {
        self.log(&batch);
        self.inner.apply(batch);
    }

    fn update(&self, keys: &[&str], f: &mut dyn FnMut(&[Option<String>]) -> Vec<StoreOp>) {
        let journal = self.journal.clone();
        self.inner.update(keys, &mut |values| {
            let batch = f(values);
            journal.lock().extend(batch.iter().map(journal_entry));
            batch
        });
    }

    fn clear(&self) {
        self.journal.lock().push("clear".to_string());
        self.inner.clear();
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[tokio::test]
async fn test_session_written_before_counter_cleared() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let stores = ClientStores {
        session: Arc::new(JournalStore {
            inner: MemoryStore::new(),
            journal: journal.clone(),
        }),
        local: Arc::new(JournalStore {
            inner: MemoryStore::new(),
            journal: journal.clone(),
        }),
    };
    let limiter = LoginLimiter::new(
        stores.local.clone(),
        Arc::new(ManualClock::new(START)),
        LockoutSettings::default(),
    );
    limiter.record_failure();
    journal.lock().clear();

    let gateway = MockAuthGateway::accepting(accepted(true, Role::Default));
    attempt_login(&gateway, &stores, &limiter, request("jperez", "password1"))
        .await
        .unwrap();

    let journal = journal.lock().clone();
    let session_written = journal.iter().position(|e| e == "set:user-info").unwrap();
    let counter_cleared = journal
        .iter()
        .position(|e| e == "remove:loginAttempts")
        .unwrap();
    assert!(session_written < counter_cleared, "journal {journal:?}");
}
