use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// GatewayError
///
/// Failure to get a usable answer from the upstream auth API. Never counted as a failed
/// login attempt: the credentials were not judged.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("auth API unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth API returned an unreadable body: {0}")]
    Decode(String),
    #[error("{0}")]
    Unavailable(String),
}

/// LoginError
///
/// Every way a login submission can be turned down. The `Display` text is the message
/// shown to the user.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Account locked. Try again in {minutes} minutes.")]
    Locked { minutes: i64, remaining_ms: i64 },

    #[error("Please enter a valid username and password.")]
    Validation {
        field_errors: BTreeMap<String, String>,
    },

    #[error("Invalid username or password. Attempt {attempt} of {max}.")]
    InvalidCredentials { attempt: u32, max: u32 },

    #[error("Too many failed attempts. Account locked for {minutes} minutes.")]
    LockedOut { minutes: i64 },

    #[error("The user is inactive. Contact the administrator.")]
    Inactive,

    #[error("Error logging in")]
    Upstream(#[source] GatewayError),

    #[error("Error logging in")]
    Session(#[from] serde_json::Error),
}

impl LoginError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LoginError::Locked { .. } | LoginError::LockedOut { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            LoginError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LoginError::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            LoginError::Inactive => StatusCode::FORBIDDEN,
            LoginError::Upstream(_) => StatusCode::BAD_GATEWAY,
            LoginError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            LoginError::Locked { .. } => "ACCOUNT_LOCKED",
            LoginError::Validation { .. } => "VALIDATION_ERROR",
            LoginError::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            LoginError::LockedOut { .. } => "TOO_MANY_ATTEMPTS",
            LoginError::Inactive => "USER_INACTIVE",
            LoginError::Upstream(_) => "LOGIN_FAILED",
            LoginError::Session(_) => "LOGIN_FAILED",
        }
    }
}

impl IntoResponse for LoginError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": true,
            "message": self.to_string(),
            "code": self.error_code(),
        });
        match &self {
            LoginError::Validation { field_errors } => {
                body["field_errors"] = json!(field_errors);
            }
            LoginError::Locked { remaining_ms, .. } => {
                body["remaining_ms"] = json!(remaining_ms);
            }
            LoginError::Upstream(e) => tracing::warn!("login failed upstream: {}", e),
            LoginError::Session(e) => tracing::error!("could not store session: {}", e),
            _ => {}
        }
        (self.status_code(), Json(body)).into_response()
    }
}

/// ApiError
///
/// Rejections of the session-bound endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or malformed x-client-id header")]
    MissingClient,
    #[error("not authenticated")]
    Unauthorized,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingClient => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::MissingClient => "MISSING_CLIENT_ID",
            ApiError::Unauthorized => "UNAUTHORIZED",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({
                "error": true,
                "message": self.to_string(),
                "code": self.error_code(),
            })),
        )
            .into_response()
    }
}
