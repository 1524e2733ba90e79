use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::User,
    repository::RepositoryState,
    session::{Session, SessionStore, StaffRole, UserRole},
};

/// Development-only identity header, honored in `Env::Local`.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of a session token. Roles are not carried; they are read from the user
/// record on every request, so a demotion takes effect on the next request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id.
    pub sub: Uuid,
    /// Expiration time (seconds since epoch).
    pub exp: usize,
    /// Issued at (seconds since epoch).
    pub iat: usize,
}

/// Signs a session token for `user_id`, valid for `config.token_ttl_secs`.
pub fn issue_token(user_id: Uuid, config: &AppConfig) -> Result<String, AppError> {
    let now = Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + config.token_ttl_secs as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
}

/// Verifies signature and expiry, returning the claims.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// RequestSession
///
/// The session store backing a single HTTP request. The token is only kept once it
/// has been verified and resolved to an existing user, so "token present" always
/// means "authenticated".
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    token: Option<String>,
    user: Option<User>,
}

impl RequestSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn verified(token: String, user: User) -> Self {
        Self {
            token: Some(token),
            user: Some(user),
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// resolve
    ///
    /// Builds the session for an incoming request:
    /// 1. `Env::Local` only: an `x-user-id` header naming an existing user.
    /// 2. `Authorization: Bearer <jwt>`, verified against the configured secret.
    /// 3. The user row is loaded so roles reflect the current database state.
    ///
    /// Any failure along the way yields an anonymous session rather than an error.
    pub async fn resolve(parts: &Parts, repo: &RepositoryState, config: &AppConfig) -> Self {
        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get(LOCAL_USER_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::parse_str(s).ok());

            if let Some(user_id) = bypass_id {
                if let Some(user) = repo.get_user(user_id).await {
                    return Self::verified(user_id.to_string(), user);
                }
            }
        }

        let Some(token) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty())
        else {
            return Self::anonymous();
        };

        let claims = match decode_token(token, &config.jwt_secret) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!("Rejected session token: {:?}", e.kind());
                return Self::anonymous();
            }
        };

        match repo.get_user(claims.sub).await {
            Some(user) => Self::verified(token.to_string(), user),
            None => {
                tracing::debug!(user_id = %claims.sub, "Token subject no longer exists");
                Self::anonymous()
            }
        }
    }
}

impl SessionStore for RequestSession {
    fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn user_role(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_role.as_str())
    }

    fn staff_role(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.staff_role.as_deref())
    }
}

/// CurrentSession
///
/// Extractor yielding the caller's `Session`, anonymous or not. It never rejects;
/// deciding what an anonymous caller may do is the guard's job.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: Session,
    pub user_id: Option<Uuid>,
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let store = RequestSession::resolve(parts, &repo, &config).await;
        Ok(CurrentSession {
            session: store.session(),
            user_id: store.user().map(|u| u.id),
        })
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Rejects with 401 when the
/// request carries no valid credential.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub user_role: Option<UserRole>,
    pub staff_role: Option<StaffRole>,
}

impl AuthUser {
    pub fn is_patron(&self) -> bool {
        self.user_role == Some(UserRole::Patron)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let store = RequestSession::resolve(parts, &repo, &config).await;
        let session = store.session();
        match store.user() {
            Some(user) if session.is_authenticated() => Ok(AuthUser {
                id: user.id,
                user_role: session.user_role,
                staff_role: session.staff_role,
            }),
            _ => Err(AppError::Unauthorized),
        }
    }
}
