//! Per-user quota enforcement.
//!
//! Charging is an explicit call rather than a layer so handlers can
//! validate the request body first; a rejected request costs nothing.

use tracing::info;

use errata_core::{
    exhausted_message, quota_warnings, QuotaRemaining, QuotaRepository, QuotaResource, User,
};

use crate::{ApiError, AppState};

/// Spend `count` units of `resource`. Admins are never charged.
pub async fn charge_quota(
    state: &AppState,
    user: &User,
    resource: QuotaResource,
    count: i32,
) -> Result<(), ApiError> {
    try_charge(state, user, resource, count)
        .await?
        .then_some(())
        .ok_or_else(|| ApiError::TooManyRequests(exhausted_message(resource)))
}

/// Like [`charge_quota`] but reports a denial as `false`, for callers with their own message.
pub async fn try_charge(
    state: &AppState,
    user: &User,
    resource: QuotaResource,
    count: i32,
) -> Result<bool, ApiError> {
    if user.is_admin {
        return Ok(true);
    }
    let granted = state
        .db
        .quotas
        .check_and_decrement(user.id, resource, count, state.config.quota.refresh_hours)
        .await?;
    if !granted {
        info!(
            subsystem = "quota",
            user_id = %user.id,
            resource = %resource,
            count,
            "Quota denied"
        );
    }
    Ok(granted)
}

/// Remaining counters (after any due refresh) and their low-quota warnings.
pub async fn remaining_with_warnings(
    state: &AppState,
    user: &User,
) -> Result<(QuotaRemaining, Vec<String>), ApiError> {
    let remaining = state
        .db
        .quotas
        .remaining(user.id, state.config.quota.refresh_hours)
        .await?;
    let warnings = quota_warnings(&remaining);
    Ok((remaining, warnings))
}
