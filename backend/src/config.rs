use std::env;

use crate::lockout::{LOCKOUT_DURATION_MS, LockoutSettings, MAX_ATTEMPTS};

/// AppConfig
///
/// Holds the gateway's entire configuration state. The struct is immutable once loaded and
/// is pulled into handlers and extractors via FromRef, like every other part of `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Controls log format and which secrets are mandatory.
    pub env: Env,
    // Base URL of the upstream authentication API. `login` is appended to it.
    pub auth_base_url: String,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // Attempt limit and lock duration for the login limiter.
    pub lockout: LockoutSettings,
    // Period of the lockout countdown tick, in milliseconds.
    pub lockout_tick_ms: u64,
}

/// Env
///
/// Defines the runtime context: a developer workstation or a deployed instance.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Provides a non-panicking AppConfig used for test setup, so router and flow tests
    /// can build state without touching the process environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            auth_base_url: "http://localhost:8000/api/auth/".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            lockout: LockoutSettings::default(),
            lockout_tick_ms: 1000,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables.
    ///
    /// # Panics
    /// Panics when `AUTH_API_URL` is missing in production, or when a numeric override is set
    /// but is not a positive integer. A gateway that cannot reach its auth provider, or that
    /// would run with a nonsensical lockout, must not start.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let auth_base_url = match env {
            Env::Production => env::var("AUTH_API_URL")
                .expect("FATAL: AUTH_API_URL must be set in production."),
            Env::Local => env::var("AUTH_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api/auth/".to_string()),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| match env {
            Env::Production => "0.0.0.0:3000".to_string(),
            Env::Local => "127.0.0.1:3000".to_string(),
        });

        let max_attempts = positive_var("MAX_LOGIN_ATTEMPTS").unwrap_or(MAX_ATTEMPTS as u64);
        let duration_ms = positive_var("LOCKOUT_MINUTES")
            .map(|minutes| minutes * 60_000)
            .unwrap_or(LOCKOUT_DURATION_MS as u64);
        let lockout_tick_ms = positive_var("LOCKOUT_TICK_MS").unwrap_or(1000);

        Self {
            env,
            auth_base_url,
            bind_addr,
            lockout: LockoutSettings {
                max_attempts: max_attempts as u32,
                duration_ms: duration_ms as i64,
            },
            lockout_tick_ms,
        }
    }
}

/// positive_var
///
/// Reads an optional numeric override. Absent means "use the default"; present but
/// unparsable or zero is a configuration error.
fn positive_var(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => panic!("FATAL: {name} must be a positive integer, got {raw:?}"),
    }
}
