use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity ---

/// Role
///
/// The coarse permission tier attached to a profile. Only two tiers exist; anything the
/// upstream API sends that is not recognisably "admin" is treated as the default tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    #[default]
    Default,
}

impl Role {
    /// parse
    ///
    /// Total conversion from the raw role string. Never fails: unrecognised, empty or
    /// differently-cased garbage maps to `Role::Default`.
    pub fn parse(raw: &str) -> Role {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Default
        }
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Default => "default",
        }
    }
}

/// Lenient deserializer for the `role` field: missing, null, numeric or unknown values all
/// become `Role::Default` instead of failing the whole profile.
fn lenient_role<'de, D>(deserializer: D) -> Result<Role, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => Role::parse(&s),
        _ => Role::Default,
    })
}

/// UserProfile
///
/// The profile returned by the upstream auth API under `usuario` and kept in the session
/// store under `user-data`. Read-only from the guard's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    // National id, 8 digits.
    #[serde(default)]
    pub dni: String,
    pub username: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub apellidos: String,
    #[serde(default)]
    pub email: String,
    // 9 digits.
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Role,
    // A profile that does not say it is active is not.
    #[serde(default)]
    pub is_active: bool,
}

/// Session
///
/// Snapshot of everything the session store holds for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// LockoutState
///
/// Persisted failure counter plus the lock deadline (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub locked_until: Option<i64>,
}

// --- Request Payloads ---

/// LoginRequest
///
/// Credentials posted by the login form (POST /api/login), and forwarded as-is (apart from
/// the sanitized username) to the upstream auth API.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// UpstreamLoginResponse
///
/// Body of a 2xx answer from `POST {AUTH_BASE}/login`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpstreamLoginResponse {
    pub usuario: UserProfile,
    pub access: String,
    pub refresh: String,
}

/// GuardQuery
///
/// Query string of GET /api/guard.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct GuardQuery {
    /// The path the client wants to navigate to.
    pub path: String,
}

// --- Responses ---

/// LoginResponse
///
/// Successful login: the stored (sanitized) profile and where the client should go next.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub profile: UserProfile,
    pub redirect_to: String,
}

/// SessionInfo
///
/// Output of GET /api/session. Tokens are never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionInfo {
    pub authenticated: bool,
    pub role: Role,
    pub display_name: String,
    pub profile: Option<UserProfile>,
}

/// LockoutStatus
///
/// Output of GET /api/lockout, recomputed from the persisted state on every call.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LockoutStatus {
    pub locked: bool,
    pub failed_attempts: u32,
    pub max_attempts: u32,
    pub remaining_ms: i64,
    pub remaining_minutes: i64,
}

/// GuardDecision
///
/// Outcome of the route access policy for one navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
#[ts(export)]
pub enum GuardDecision {
    Render {
        view: String,
        params: BTreeMap<String, String>,
    },
    Redirect {
        to: String,
    },
}

impl GuardDecision {
    pub fn render(&self) -> bool {
        matches!(self, GuardDecision::Render { .. })
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            GuardDecision::Redirect { to } => Some(to),
            GuardDecision::Render { .. } => None,
        }
    }
}

/// ViewResponse
///
/// What a guarded GET returns when the view may be rendered: which screen, the path
/// parameters it was opened with, and whether the navigation chrome is shown.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ViewResponse {
    pub view: String,
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub navigation: bool,
}

/// MenuItem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuItem {
    pub label: String,
    pub route: String,
}

/// MenuSection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuSection {
    pub label: String,
    pub items: Vec<MenuItem>,
}

/// MenuView
///
/// Sidebar payload (GET /api/menu): header data plus the role-filtered sections.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuView {
    pub display_name: String,
    pub role_label: String,
    pub sections: Vec<MenuSection>,
    pub home_tiles: Vec<MenuItem>,
}
