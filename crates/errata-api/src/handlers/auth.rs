//! Account handlers: registration, login, logout, profile and API key.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use errata_core::defaults::PASSWORD_MIN_LEN;
use errata_core::{NewUser, SessionRepository, UserRepository};
use errata_crypto::{generate_session_token, hash_password, hash_token, verify_password};

use crate::auth::RequireAuth;
use crate::middleware::remaining_with_warnings;
use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

/// Create a session for `user_id` and return the raw token.
pub async fn issue_session(state: &AppState, user_id: Uuid) -> Result<String, ApiError> {
    let token = generate_session_token();
    let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
    state
        .db
        .sessions
        .create(user_id, &hash_token(&token), expires_at)
        .await?;
    Ok(token)
}

/// Hash on the blocking pool.
async fn hash_off_thread(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Register a new account.
///
/// # Returns
/// - 201 Created with `{message, user{id,username}, token}`
/// - 400 Bad Request on missing fields or a short password
/// - 409 Conflict when the username or email is taken
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    let password = req.password;

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest("All fields are required".to_string()));
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    if state.db.users.username_taken(&username).await? {
        return Err(ApiError::Conflict("Username already taken".to_string()));
    }
    if state.db.users.email_taken(&email).await? {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_off_thread(password).await?;
    let user = state
        .db
        .users
        .create(
            NewUser {
                username,
                email,
                password_hash,
                is_admin: false,
            },
            state.config.quota,
        )
        .await?;
    let token = issue_session(&state, user.id).await?;

    info!(subsystem = "api", user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "user": {"id": user.id, "username": user.username},
            "token": token,
        })),
    ))
}

/// Exchange credentials for a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let user = state
        .db
        .users
        .find_by_username(req.username.trim())
        .await?
        .ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Password check task failed: {}", e)))?
        .unwrap_or(false);
    if !verified {
        return Err(invalid());
    }

    let token = issue_session(&state, user.id).await?;
    Ok(Json(json!({
        "message": "Login successful",
        "user": {"id": user.id, "username": user.username, "is_admin": user.is_admin},
        "token": token,
    })))
}

/// Revoke the presented token.
pub async fn logout(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Value>, ApiError> {
    state.db.sessions.revoke(&hash_token(&auth.token)).await?;
    Ok(Json(json!({"message": "Logged out"})))
}

/// The current user with remaining quota and low-quota warnings.
pub async fn me(State(state): State<AppState>, auth: RequireAuth) -> Result<Json<Value>, ApiError> {
    let user = auth.user;
    let (quota, warnings) = remaining_with_warnings(&state, &user).await?;
    let has_api_key = user.has_own_api_key();
    Ok(Json(json!({
        "user": {
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "is_admin": user.is_admin,
            "has_api_key": has_api_key,
        },
        "quota": quota,
        "warnings": warnings,
    })))
}

/// Store, replace or (with an empty value) clear the user's OpenRouter key.
pub async fn update_api_key(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(req): Json<ApiKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let key = req.api_key.trim();
    let sealed = if key.is_empty() {
        None
    } else {
        Some(state.cipher.seal(key)?)
    };
    state
        .db
        .users
        .set_api_key(auth.user.id, sealed.as_deref())
        .await?;

    Ok(Json(json!({
        "message": "API key updated",
        "has_api_key": sealed.is_some(),
    })))
}
