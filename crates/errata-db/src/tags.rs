//! Subject and tag repository.
//!
//! Both are plain per-user name tables; names are unique per user and
//! created on first use.

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use errata_core::{Error, Result, Subject, Tag, TagRepository};

/// PostgreSQL implementation of TagRepository.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Which name table to resolve against.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NameTable {
    Subjects,
    Tags,
}

impl NameTable {
    fn table(self) -> &'static str {
        match self {
            NameTable::Subjects => "subjects",
            NameTable::Tags => "tags",
        }
    }
}

/// Get-or-create a name row inside an existing connection or transaction.
///
/// The upsert touches the row on conflict so `RETURNING` always yields the id.
pub(crate) async fn get_or_create_name(
    conn: &mut PgConnection,
    table: NameTable,
    user_id: Uuid,
    name: &str,
) -> Result<Uuid> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} name cannot be empty",
            table.table()
        )));
    }
    let sql = format!(
        "INSERT INTO {} (id, user_id, name) VALUES ($1, $2, $3)
         ON CONFLICT (name, user_id) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
        table.table()
    );
    sqlx::query_scalar(&sql)
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(name)
        .fetch_one(conn)
        .await
        .map_err(Error::Database)
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn list_subjects(&self, user_id: Uuid) -> Result<Vec<Subject>> {
        let rows = sqlx::query("SELECT id, name FROM subjects WHERE user_id = $1 ORDER BY name")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| Subject {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn list_tags(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name FROM tags WHERE user_id = $1 ORDER BY name")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| Tag {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn get_or_create_subject(&self, user_id: Uuid, name: &str) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        get_or_create_name(&mut conn, NameTable::Subjects, user_id, name).await
    }

    async fn get_or_create_tag(&self, user_id: Uuid, name: &str) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        get_or_create_name(&mut conn, NameTable::Tags, user_id, name).await
    }
}
