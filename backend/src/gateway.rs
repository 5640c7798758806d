use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    error::GatewayError,
    models::{LoginRequest, UpstreamLoginResponse},
};

/// AuthReply
///
/// What the upstream auth API said about a set of credentials.
#[derive(Debug, Clone)]
pub enum AuthReply {
    /// 2xx with a readable body.
    Accepted(UpstreamLoginResponse),
    /// Any non-2xx status. Counted as invalid credentials.
    Rejected(u16),
}

// 1. AuthGateway Contract
/// AuthGateway
///
/// Abstracts the external authentication API so the login flow can run against the real
/// HTTP endpoint in production and a scripted double in tests.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// POST `{AUTH_BASE}/login` with `{ username, password }`.
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthReply, GatewayError>;
}

// 2. The Real Implementation
/// HttpAuthGateway
#[derive(Clone)]
pub struct HttpAuthGateway {
    client: reqwest::Client,
    login_url: String,
}

impl HttpAuthGateway {
    /// `base_url` is the auth API root; `login` is appended with exactly one slash.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            login_url: format!("{}/login", base_url.trim_end_matches('/')),
        }
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthReply, GatewayError> {
        let response = self
            .client
            .post(&self.login_url)
            .header("Accept", "*/*")
            .json(&serde_json::json!({
                "username": credentials.username,
                "password": credentials.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "auth API rejected credentials");
            return Ok(AuthReply::Rejected(status.as_u16()));
        }

        let body = response
            .json::<UpstreamLoginResponse>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(AuthReply::Accepted(body))
    }
}

// 3. The Mock Implementation (For Tests)
/// MockAuthGateway
///
/// Replays a fixed reply and records every call, so tests can assert that a locked client
/// never reaches the network.
#[derive(Clone)]
pub struct MockAuthGateway {
    reply: MockReply,
    calls: Arc<AtomicUsize>,
    last_request: Arc<Mutex<Option<LoginRequest>>>,
}

#[derive(Clone)]
enum MockReply {
    Accept(UpstreamLoginResponse),
    Reject(u16),
    Fail,
}

impl MockAuthGateway {
    fn with(reply: MockReply) -> Self {
        Self {
            reply,
            calls: Arc::new(AtomicUsize::new(0)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn accepting(response: UpstreamLoginResponse) -> Self {
        Self::with(MockReply::Accept(response))
    }

    pub fn rejecting(status: u16) -> Self {
        Self::with(MockReply::Reject(status))
    }

    /// Simulates a transport failure.
    pub fn failing() -> Self {
        Self::with(MockReply::Fail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LoginRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl AuthGateway for MockAuthGateway {
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthReply, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(credentials.clone());

        match &self.reply {
            MockReply::Accept(response) => Ok(AuthReply::Accepted(response.clone())),
            MockReply::Reject(status) => Ok(AuthReply::Rejected(*status)),
            MockReply::Fail => Err(GatewayError::Unavailable(
                "Mock Gateway Error: Simulation requested".to_string(),
            )),
        }
    }
}

/// AuthGatewayState
///
/// The concrete type used to share the gateway across the application state.
pub type AuthGatewayState = Arc<dyn AuthGateway>;
