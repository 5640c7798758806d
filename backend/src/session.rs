use crate::{
    models::{Role, Session, UpstreamLoginResponse, UserProfile},
    sanitizer::sanitize_input,
    store::{KeyValueStore, StoreOp},
};

// Session store keys.
pub const AUTH_FLAG_KEY: &str = "user-info";
pub const PROFILE_KEY: &str = "user-data";
pub const ACCESS_KEY: &str = "access";
pub const REFRESH_KEY: &str = "refresh";

// The only value of `user-info` that counts as logged in.
const AUTH_FLAG_TRUE: &str = "true";

/// SessionReader
///
/// Read-only view over a client's session store. Every accessor tolerates missing or
/// malformed data: the worst outcome is "unauthenticated" with the default role.
pub struct SessionReader<'a> {
    store: &'a dyn KeyValueStore,
}

impl<'a> SessionReader<'a> {
    pub fn new(store: &'a dyn KeyValueStore) -> Self {
        Self { store }
    }

    /// True iff the auth flag holds exactly the literal `"true"`.
    pub fn is_authenticated(&self) -> bool {
        self.store.get(AUTH_FLAG_KEY).as_deref() == Some(AUTH_FLAG_TRUE)
    }

    /// user_profile
    ///
    /// Parses the stored profile. Absent or unparsable JSON yields `None`, never an error.
    pub fn user_profile(&self) -> Option<UserProfile> {
        let raw = self.store.get(PROFILE_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::debug!("ignoring malformed stored profile: {}", e);
                None
            }
        }
    }

    pub fn role(&self) -> Role {
        role_of(self.user_profile().as_ref())
    }

    pub fn access_token(&self) -> Option<String> {
        self.token(ACCESS_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.token(REFRESH_KEY)
    }

    // Tokens are stored JSON-encoded ("\"abc\"").
    fn token(&self, key: &str) -> Option<String> {
        let raw = self.store.get(key)?;
        serde_json::from_str::<String>(&raw).ok()
    }

    pub fn snapshot(&self) -> Session {
        Session {
            authenticated: self.is_authenticated(),
            user: self.user_profile(),
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
        }
    }
}

/// role_of
///
/// The role of a (possibly absent) profile. No profile means the default role.
pub fn role_of(profile: Option<&UserProfile>) -> Role {
    profile.map(|p| p.role).unwrap_or_default()
}

/// display_name
///
/// Name shown in the sidebar header: the first name, falling back to the username.
pub fn display_name(profile: Option<&UserProfile>) -> String {
    match profile {
        Some(p) if !p.nombre.trim().is_empty() => p.nombre.clone(),
        Some(p) => p.username.clone(),
        None => String::new(),
    }
}

/// establish_session
///
/// Writes a fresh session after a successful login as one atomic batch: the auth flag,
/// the sanitized profile and both tokens. Returns the profile exactly as it was stored.
pub fn establish_session(
    store: &dyn KeyValueStore,
    upstream: &UpstreamLoginResponse,
) -> Result<UserProfile, serde_json::Error> {
    let sanitized = sanitize_input(serde_json::to_value(&upstream.usuario)?);
    let profile: UserProfile = serde_json::from_value(sanitized)?;

    store.apply(vec![
        StoreOp::set(AUTH_FLAG_KEY, AUTH_FLAG_TRUE),
        StoreOp::set(PROFILE_KEY, serde_json::to_string(&profile)?),
        StoreOp::set(ACCESS_KEY, serde_json::to_string(&upstream.access)?),
        StoreOp::set(REFRESH_KEY, serde_json::to_string(&upstream.refresh)?),
    ]);

    Ok(profile)
}

/// clear_session
///
/// Logout. Wipes the whole session store; the longer-lived store is left alone.
pub fn clear_session(store: &dyn KeyValueStore) {
    store.clear();
}
