use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::{
    error::LoginError,
    gateway::{AuthGateway, AuthReply},
    lockout::{LoginLimiter, minutes_remaining},
    models::{LoginRequest, UserProfile},
    policy::HOME_ROUTE,
    sanitizer::sanitize_str,
    session::establish_session,
    store::ClientStores,
};

const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 100;

static USERNAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("static username pattern"));

/// LoginSuccess
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub profile: UserProfile,
    pub redirect_to: String,
}

/// validate_credentials
///
/// Form rules of the login screen. Lengths count characters, not bytes.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), LoginError> {
    let mut field_errors = BTreeMap::new();

    if username.is_empty() {
        field_errors.insert("username".to_string(), "This field is required".to_string());
    } else if username.chars().count() > USERNAME_MAX {
        field_errors.insert(
            "username".to_string(),
            format!("Username cannot be longer than {USERNAME_MAX} characters"),
        );
    } else if !USERNAME_CHARS.is_match(username) {
        field_errors.insert(
            "username".to_string(),
            "Username may only contain letters, numbers and underscores".to_string(),
        );
    }

    let password_len = password.chars().count();
    if password.is_empty() {
        field_errors.insert("password".to_string(), "This field is required".to_string());
    } else if password_len < PASSWORD_MIN {
        field_errors.insert(
            "password".to_string(),
            format!("Password must be at least {PASSWORD_MIN} characters"),
        );
    } else if password_len > PASSWORD_MAX {
        field_errors.insert(
            "password".to_string(),
            format!("Password cannot be longer than {PASSWORD_MAX} characters"),
        );
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(LoginError::Validation { field_errors })
    }
}

/// attempt_login
///
/// One login submission, in this order:
/// 1. A locked client is turned away before anything else happens.
/// 2. The username is sanitized and both fields validated. The password is forwarded
///    untouched.
/// 3. The upstream auth API judges the credentials.
/// 4. A rejection counts against the lockout; an inactive account is refused without
///    counting; a transport failure changes nothing; a success clears the lockout and
///    establishes the session.
pub async fn attempt_login(
    gateway: &dyn AuthGateway,
    stores: &ClientStores,
    limiter: &LoginLimiter,
    request: LoginRequest,
) -> Result<LoginSuccess, LoginError> {
    limiter.ensure_unlocked()?;

    let username = sanitize_str(&request.username);
    let password = request.password;
    validate_credentials(&username, &password)?;

    let credentials = LoginRequest { username, password };
    let reply = gateway
        .login(&credentials)
        .await
        .map_err(LoginError::Upstream)?;

    match reply {
        AuthReply::Accepted(body) => {
            if !body.usuario.is_active {
                tracing::info!(username = %credentials.username, "login refused: user inactive");
                return Err(LoginError::Inactive);
            }

            // The counter is only cleared once the session is in place.
            let profile = establish_session(stores.session.as_ref(), &body)?;
            limiter.record_success();
            tracing::info!(username = %profile.username, role = profile.role.as_str(), "login succeeded");

            Ok(LoginSuccess {
                profile,
                redirect_to: HOME_ROUTE.to_string(),
            })
        }
        AuthReply::Rejected(status) => {
            let state = limiter.record_failure();
            let settings = limiter.settings();
            tracing::info!(
                status,
                attempts = state.failed_attempts,
                "login rejected by auth API"
            );

            if state.locked_until.is_some() {
                Err(LoginError::LockedOut {
                    minutes: minutes_remaining(settings.duration_ms),
                })
            } else {
                Err(LoginError::InvalidCredentials {
                    attempt: state.failed_attempts,
                    max: settings.max_attempts,
                })
            }
        }
    }
}
