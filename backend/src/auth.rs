use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Role, UserProfile},
    session::{SessionReader, role_of},
    store::{ClientStores, StoreRegistry, StoreState},
};

/// Header carrying the client id: the key under which a client's stores are kept.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// client_id
///
/// Parses the client id header. A missing or non-UUID value yields `None`.
pub fn client_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|id_str| Uuid::parse_str(id_str.trim()).ok())
}

/// ClientContext
///
/// The resolved client of a request: its id and its two stores.
#[derive(Clone)]
pub struct ClientContext {
    pub id: Option<Uuid>,
    pub stores: ClientStores,
}

impl ClientContext {
    /// resolve_or_guest
    ///
    /// Read-only paths (views, guard checks, lockout status) never reject and never register
    /// a client. A request without a usable client id, or with one the registry has not seen,
    /// is served with empty throwaway stores.
    pub fn resolve_or_guest(headers: &HeaderMap, registry: &StoreRegistry) -> Self {
        let id = client_id(headers);
        let stores = id
            .and_then(|id| registry.get(id))
            .unwrap_or_else(ClientStores::ephemeral);
        Self { id, stores }
    }

    pub fn session(&self) -> SessionReader<'_> {
        SessionReader::new(self.stores.session.as_ref())
    }
}

/// ClientContext Extractor Implementation
///
/// Used by handlers that write client state (login). Those need a real, registered client
/// id, so a missing or malformed header is rejected with 400.
impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
    StoreState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let registry = StoreState::from_ref(state);
        let id = client_id(&parts.headers).ok_or(ApiError::MissingClient)?;

        Ok(ClientContext {
            id: Some(id),
            stores: registry.stores_for(id),
        })
    }
}

/// AuthUser
///
/// The resolved identity of a request made from a logged-in session.
#[derive(Clone)]
pub struct AuthUser {
    pub client: ClientContext,
    pub profile: Option<UserProfile>,
    pub role: Role,
}

/// AuthUser Extractor Implementation
///
/// 1. Look up the client by its id header, without registering it.
/// 2. Require the session's auth flag.
/// 3. Load the profile and role, tolerating a malformed profile (default role).
///
/// Rejection: 401 on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    StoreState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let registry = StoreState::from_ref(state);
        let id = client_id(&parts.headers).ok_or(ApiError::Unauthorized)?;
        // A client the registry never saw cannot hold a session.
        let stores = registry.get(id).ok_or(ApiError::Unauthorized)?;
        let client = ClientContext {
            id: Some(id),
            stores,
        };

        let reader = client.session();
        if !reader.is_authenticated() {
            return Err(ApiError::Unauthorized);
        }
        let profile = reader.user_profile();
        let role = role_of(profile.as_ref());

        Ok(AuthUser {
            client,
            profile,
            role,
        })
    }
}
