//! Bearer-token authentication extractors.
//!
//! Tokens are opaque session tokens issued by register/login. The raw
//! token is hashed and resolved against unexpired sessions.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use errata_core::{AuthPrincipal, SessionRepository, User};
use errata_crypto::{hash_token, looks_like_session_token};

use crate::{ApiError, AppState};

/// Pull the bearer token out of an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extractor for optionally authenticated requests.
///
/// Never rejects: a missing, malformed or expired token yields
/// [`AuthPrincipal::Anonymous`].
#[derive(Debug, Clone)]
pub struct Auth {
    pub principal: AuthPrincipal,
    pub user: Option<User>,
    /// The presented token, kept so logout can revoke it.
    pub token: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .filter(|t| looks_like_session_token(t))
            .map(str::to_string);

        let Some(token) = token else {
            return Ok(Auth {
                principal: AuthPrincipal::Anonymous,
                user: None,
                token: None,
            });
        };

        let user = state.db.sessions.resolve(&hash_token(&token)).await?;
        let principal = match &user {
            Some(u) => AuthPrincipal::User {
                user_id: u.id,
                username: u.username.clone(),
                is_admin: u.is_admin,
            },
            None => AuthPrincipal::Anonymous,
        };

        Ok(Auth {
            principal,
            user,
            token: Some(token),
        })
    }
}

/// Extractor that requires a valid session.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = Auth::from_request_parts(parts, state).await?;

        match (auth.user, auth.token) {
            (Some(user), Some(token)) if auth.principal.is_authenticated() => {
                Ok(RequireAuth { user, token })
            }
            _ => Err(ApiError::Unauthorized("Login required".to_string())),
        }
    }
}

/// Extractor that requires an admin session.
#[derive(Debug, Clone)]
pub struct RequireAdmin {
    pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = Auth::from_request_parts(parts, state).await?;
        if !auth.principal.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }
        match auth.user {
            Some(user) => Ok(RequireAdmin { user }),
            None => Err(ApiError::Forbidden("Admin access required".to_string())),
        }
    }
}
