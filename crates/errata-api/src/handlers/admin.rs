//! Admin handlers: user listing and quota management.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use errata_core::{QuotaRepository, QuotaUpdate, UserRepository};

use crate::auth::RequireAdmin;
use crate::{ApiError, AppState};

/// Every user with their quota (null when no quota row exists).
pub async fn list_users(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    let users = state.db.users.list().await?;
    let mut rows = Vec::with_capacity(users.len());
    for user in users {
        let quota = state.db.quotas.fetch(user.id).await?;
        rows.push(json!({
            "id": user.id,
            "username": user.username,
            "email": user.email,
            "is_admin": user.is_admin,
            "has_api_key": user.has_own_api_key(),
            "created_at": user.created_at,
            "quota": quota.map(|q| q.to_detail()),
        }));
    }
    Ok(Json(json!({"users": rows})))
}

/// Set limits and remaining counts; absent fields stay unchanged.
pub async fn update_user_quota(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(user_id): Path<Uuid>,
    Json(update): Json<QuotaUpdate>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .users
        .fetch(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let quota = state
        .db
        .quotas
        .update(user_id, &update, state.config.quota)
        .await?;

    info!(
        subsystem = "api",
        component = "admin",
        admin_id = %admin.user.id,
        user_id = %user_id,
        "Quota updated"
    );
    Ok(Json(json!({
        "message": "Quota updated",
        "quota": quota.to_detail(),
    })))
}
