//! Chat thread and message repository.
//!
//! Messages are ordered by `(created_at, id)`; ids are UUIDv7 so the
//! tie-break follows insertion order.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use errata_core::{role, ChatRepository, ChatThread, Error, Result, ThreadMessage};

fn thread_from_row(row: &PgRow) -> ChatThread {
    ChatThread {
        id: row.get("id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
    }
}

fn message_from_row(row: &PgRow) -> ThreadMessage {
    ThreadMessage {
        id: row.get("id"),
        role: row.get("role"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

/// PostgreSQL implementation of ChatRepository.
#[derive(Clone)]
pub struct PgChatRepository {
    pool: Pool<Postgres>,
}

impl PgChatRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn list_threads(&self, user_id: Uuid) -> Result<Vec<ChatThread>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at FROM chat_threads
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(thread_from_row).collect())
    }

    async fn create_thread(&self, user_id: Uuid, title: &str) -> Result<ChatThread> {
        let thread = ChatThread {
            id: Uuid::now_v7(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO chat_threads (id, user_id, title, created_at) VALUES ($1, $2, $3, $4)")
            .bind(thread.id)
            .bind(user_id)
            .bind(&thread.title)
            .bind(thread.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(thread)
    }

    async fn fetch_thread(&self, user_id: Uuid, id: Uuid) -> Result<ChatThread> {
        let row = sqlx::query(
            "SELECT id, title, created_at FROM chat_threads WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound("Thread not found".to_string()))?;
        Ok(thread_from_row(&row))
    }

    async fn delete_thread(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM chat_threads WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Thread not found".to_string()));
        }
        Ok(())
    }

    async fn rename_thread(&self, thread_id: Uuid, title: &str) -> Result<()> {
        sqlx::query("UPDATE chat_threads SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn messages(&self, thread_id: Uuid) -> Result<Vec<ThreadMessage>> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at FROM chat_messages
             WHERE thread_id = $1 ORDER BY created_at, id",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn append(&self, thread_id: Uuid, role: &str, content: &str) -> Result<ThreadMessage> {
        let message = ThreadMessage {
            id: Uuid::now_v7(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO chat_messages (id, thread_id, role, content, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id)
        .bind(thread_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(message)
    }

    async fn edit_user_message(
        &self,
        thread_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<ThreadMessage> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "UPDATE chat_messages SET content = $1
             WHERE id = $2 AND thread_id = $3 AND role = $4
             RETURNING id, role, content, created_at",
        )
        .bind(content)
        .bind(message_id)
        .bind(thread_id)
        .bind(role::USER)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound("Message not found".to_string()))?;
        let message = message_from_row(&row);

        let removed = sqlx::query(
            "DELETE FROM chat_messages
             WHERE thread_id = $1 AND (created_at, id) > ($2, $3)",
        )
        .bind(thread_id)
        .bind(message.created_at)
        .bind(message.id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "chat",
            component = "repository",
            op = "edit_user_message",
            thread_id = %thread_id,
            result_count = removed,
            "Edited message and truncated later history"
        );
        Ok(message)
    }

    async fn delete_last_assistant(&self, thread_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM chat_messages WHERE id = (
                SELECT id FROM chat_messages
                WHERE thread_id = $1 AND role = $2
                ORDER BY created_at DESC, id DESC
                LIMIT 1
             )",
        )
        .bind(thread_id)
        .bind(role::ASSISTANT)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn last_user_message(&self, thread_id: Uuid) -> Result<Option<ThreadMessage>> {
        let row = sqlx::query(
            "SELECT id, role, content, created_at FROM chat_messages
             WHERE thread_id = $1 AND role = $2
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(thread_id)
        .bind(role::USER)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(message_from_row))
    }
}
