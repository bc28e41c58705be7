//! Quota repository.
//!
//! Refresh and consumption rules live on [`errata_core::Quota`]; this module
//! loads the row under `FOR UPDATE`, applies them and writes the row back so
//! concurrent requests serialize on the user's quota.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, PgConnection, Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use errata_core::{
    Error, Quota, QuotaDefaults, QuotaRemaining, QuotaRepository, QuotaResource, QuotaUpdate,
    Result,
};

const QUOTA_COLUMNS: &str = "user_id, remaining_chat, remaining_images, remaining_quizzes, \
     max_chat, max_images, max_quizzes, refresh_interval_hours, last_refresh";

fn quota_from_row(row: &PgRow) -> Quota {
    Quota {
        user_id: row.get("user_id"),
        remaining_chat: row.get("remaining_chat"),
        remaining_images: row.get("remaining_images"),
        remaining_quizzes: row.get("remaining_quizzes"),
        max_chat: row.get("max_chat"),
        max_images: row.get("max_images"),
        max_quizzes: row.get("max_quizzes"),
        refresh_interval_hours: row.get("refresh_interval_hours"),
        last_refresh: row.get("last_refresh"),
    }
}

async fn lock_quota(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<Quota>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM quotas WHERE user_id = $1 FOR UPDATE",
        QUOTA_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .map_err(Error::Database)?;
    Ok(row.as_ref().map(quota_from_row))
}

async fn store_quota(conn: &mut PgConnection, quota: &Quota) -> Result<()> {
    sqlx::query(
        "UPDATE quotas SET remaining_chat = $2, remaining_images = $3, remaining_quizzes = $4,
                           max_chat = $5, max_images = $6, max_quizzes = $7,
                           refresh_interval_hours = $8, last_refresh = $9
         WHERE user_id = $1",
    )
    .bind(quota.user_id)
    .bind(quota.remaining_chat)
    .bind(quota.remaining_images)
    .bind(quota.remaining_quizzes)
    .bind(quota.max_chat)
    .bind(quota.max_images)
    .bind(quota.max_quizzes)
    .bind(quota.refresh_interval_hours)
    .bind(quota.last_refresh)
    .execute(conn)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// PostgreSQL implementation of QuotaRepository.
#[derive(Clone)]
pub struct PgQuotaRepository {
    pool: Pool<Postgres>,
}

impl PgQuotaRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaRepository for PgQuotaRepository {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Quota>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM quotas WHERE user_id = $1",
            QUOTA_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(quota_from_row))
    }

    async fn remaining(&self, user_id: Uuid, default_hours: i32) -> Result<QuotaRemaining> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let Some(mut quota) = lock_quota(&mut tx, user_id).await? else {
            return Ok(QuotaRemaining::default());
        };
        if quota.refresh_if_due(Utc::now(), default_hours) {
            store_quota(&mut tx, &quota).await?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(quota.to_remaining())
    }

    async fn check_and_decrement(
        &self,
        user_id: Uuid,
        resource: QuotaResource,
        count: i32,
        default_hours: i32,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let Some(mut quota) = lock_quota(&mut tx, user_id).await? else {
            return Ok(false);
        };

        let refreshed = quota.refresh_if_due(Utc::now(), default_hours);
        let granted = quota.try_consume(resource, count);
        if refreshed || granted {
            store_quota(&mut tx, &quota).await?;
        }
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "quota",
            component = "repository",
            op = "check_and_decrement",
            user_id = %user_id,
            resource = %resource,
            count = count,
            granted = granted,
            remaining = quota.remaining(resource),
            "Quota checked"
        );
        Ok(granted)
    }

    async fn update(
        &self,
        user_id: Uuid,
        update: &QuotaUpdate,
        defaults: QuotaDefaults,
    ) -> Result<Quota> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let mut quota = match lock_quota(&mut tx, user_id).await? {
            Some(quota) => quota,
            None => {
                let quota = Quota::with_defaults(user_id, defaults, now);
                sqlx::query(
                    "INSERT INTO quotas (id, user_id, remaining_chat, remaining_images, remaining_quizzes,
                                         max_chat, max_images, max_quizzes, refresh_interval_hours, last_refresh)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(Uuid::now_v7())
                .bind(user_id)
                .bind(quota.remaining_chat)
                .bind(quota.remaining_images)
                .bind(quota.remaining_quizzes)
                .bind(quota.max_chat)
                .bind(quota.max_images)
                .bind(quota.max_quizzes)
                .bind(quota.refresh_interval_hours)
                .bind(quota.last_refresh)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                quota
            }
        };

        quota.apply(update);
        store_quota(&mut tx, &quota).await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "quota",
            component = "repository",
            op = "update",
            user_id = %user_id,
            "Quota updated"
        );
        Ok(quota)
    }
}
