//! Note repository: notes with their subject, tags and mistake items.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::Query,
    PgConnection, Pool, Postgres, Row,
};
use tracing::{debug, info};
use uuid::Uuid;

use errata_core::{
    defaults, CreateNoteRequest, Error, ListNotesRequest, MistakeItem, MistakeItemInput, Note,
    NoteFilter, NotePage, NoteRepository, Result, SolveStatus, UpdateNoteRequest,
};

use crate::escape_like;
use crate::tags::{get_or_create_name, NameTable};

const NOTE_SELECT: &str = r#"
    SELECT n.id, n.title, n.content_md, n.status, n.subject_id, s.name AS subject_name,
           n.created_at, n.updated_at
    FROM notes n
    LEFT JOIN subjects s ON s.id = n.subject_id
"#;

/// Shared WHERE clause. `$1` is the owner; `$2..$7` are nullable filters.
///
/// The tag filter requires every requested tag, so the count of matching
/// links must equal the number of (deduplicated) requested ids.
const NOTE_FILTER: &str = r#"
    WHERE n.user_id = $1
      AND ($2::uuid IS NULL OR n.subject_id = $2)
      AND ($3::text IS NULL OR n.status = $3)
      AND ($4::timestamptz IS NULL OR n.created_at >= $4)
      AND ($5::timestamptz IS NULL OR n.created_at <= $5)
      AND ($6::text IS NULL OR n.title ILIKE $6 OR n.content_md ILIKE $6)
      AND (cardinality($7::uuid[]) = 0 OR (
            SELECT COUNT(*) FROM note_tags nt
            WHERE nt.note_id = n.id AND nt.tag_id = ANY($7)
          ) = cardinality($7::uuid[]))
"#;

fn bind_filter<'q>(
    query: Query<'q, Postgres, PgArguments>,
    user_id: Uuid,
    filter: &NoteFilter,
) -> Query<'q, Postgres, PgArguments> {
    let mut tag_ids = filter.tag_ids.clone();
    tag_ids.sort();
    tag_ids.dedup();

    let pattern = filter
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", escape_like(q)));

    query
        .bind(user_id)
        .bind(filter.subject_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pattern)
        .bind(tag_ids)
}

fn parse_status(raw: &str) -> Result<SolveStatus> {
    raw.parse()
}

fn note_from_row(row: &PgRow) -> Result<Note> {
    let status: String = row.get("status");
    Ok(Note {
        id: row.get("id"),
        title: row.get("title"),
        content_md: row.get("content_md"),
        status: parse_status(&status)?,
        subject: row.get("subject_name"),
        subject_id: row.get("subject_id"),
        tags: Vec::new(),
        tag_ids: Vec::new(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        mistake_items: Vec::new(),
    })
}

fn mistake_from_row(row: &PgRow) -> Result<MistakeItem> {
    let status: String = row.get("status");
    Ok(MistakeItem {
        id: row.get("id"),
        note_id: row.get("note_id"),
        crop_image_path: row.get("crop_image_path"),
        correction_image_path: row.get("correction_image_path"),
        diagram_image_path: row.get("diagram_image_path"),
        ocr_question: row.get("ocr_question"),
        ocr_answer: row.get("ocr_answer"),
        status: parse_status(&status)?,
        bbox_json: row.get("bbox_json"),
        confidence: row.get("confidence"),
        needs_user_edit: row.get("needs_user_edit"),
    })
}

/// Attach tags and mistake items to a batch of notes with two queries.
async fn hydrate(conn: &mut PgConnection, notes: &mut [Note]) -> Result<()> {
    if notes.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = notes.iter().map(|n| n.id).collect();

    let tag_rows = sqlx::query(
        "SELECT nt.note_id, t.id, t.name
         FROM note_tags nt JOIN tags t ON t.id = nt.tag_id
         WHERE nt.note_id = ANY($1)
         ORDER BY t.name",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Database)?;

    let mut tags: HashMap<Uuid, Vec<(Uuid, String)>> = HashMap::new();
    for row in tag_rows {
        tags.entry(row.get("note_id"))
            .or_default()
            .push((row.get("id"), row.get("name")));
    }

    let item_rows = sqlx::query(
        "SELECT id, note_id, crop_image_path, correction_image_path, diagram_image_path,
                ocr_question, ocr_answer, status, bbox_json, confidence, needs_user_edit
         FROM mistake_items
         WHERE note_id = ANY($1)
         ORDER BY position, id",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Database)?;

    let mut items: HashMap<Uuid, Vec<MistakeItem>> = HashMap::new();
    for row in &item_rows {
        let item = mistake_from_row(row)?;
        items.entry(item.note_id).or_default().push(item);
    }

    for note in notes.iter_mut() {
        if let Some(list) = tags.remove(&note.id) {
            let (ids, names) = list.into_iter().unzip();
            note.tag_ids = ids;
            note.tags = names;
        }
        note.mistake_items = items.remove(&note.id).unwrap_or_default();
    }
    Ok(())
}

async fn insert_mistake_items(
    conn: &mut PgConnection,
    note_id: Uuid,
    items: &[MistakeItemInput],
) -> Result<()> {
    for (position, item) in items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO mistake_items
                (id, note_id, crop_image_path, correction_image_path, diagram_image_path,
                 ocr_question, ocr_answer, status, bbox_json, confidence, needs_user_edit, position)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(Uuid::now_v7())
        .bind(note_id)
        .bind(&item.crop_image_path)
        .bind(&item.correction_image_path)
        .bind(&item.diagram_image_path)
        .bind(&item.ocr_question)
        .bind(&item.ocr_answer)
        .bind(item.status.as_str())
        .bind(&item.bbox_json)
        .bind(item.confidence)
        .bind(item.needs_user_edit)
        .bind(position as i32)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }
    Ok(())
}

/// Replace a note's tag links with the named tags (blank names skipped).
async fn replace_tags(
    conn: &mut PgConnection,
    user_id: Uuid,
    note_id: Uuid,
    names: &[String],
) -> Result<()> {
    sqlx::query("DELETE FROM note_tags WHERE note_id = $1")
        .bind(note_id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let tag_id = get_or_create_name(&mut *conn, NameTable::Tags, user_id, name).await?;
        sqlx::query(
            "INSERT INTO note_tags (note_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(note_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }
    Ok(())
}

/// Resolve an optional subject name; blank means none.
async fn resolve_subject(
    conn: &mut PgConnection,
    user_id: Uuid,
    name: Option<&str>,
) -> Result<Option<Uuid>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => Ok(Some(
            get_or_create_name(conn, NameTable::Subjects, user_id, name).await?,
        )),
        None => Ok(None),
    }
}

/// PostgreSQL implementation of NoteRepository.
#[derive(Clone)]
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn fetch_on(&self, conn: &mut PgConnection, user_id: Uuid, id: Uuid) -> Result<Note> {
        let row = sqlx::query(&format!(
            "{} WHERE n.id = $1 AND n.user_id = $2",
            NOTE_SELECT
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound("Note not found".to_string()))?;

        let mut notes = vec![note_from_row(&row)?];
        hydrate(conn, &mut notes).await?;
        notes
            .pop()
            .ok_or_else(|| Error::NotFound("Note not found".to_string()))
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, user_id: Uuid, req: CreateNoteRequest) -> Result<Note> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let title = req
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(defaults::NOTE_TITLE);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let subject_id = resolve_subject(&mut tx, user_id, req.subject.as_deref()).await?;

        sqlx::query(
            "INSERT INTO notes (id, user_id, subject_id, title, content_md, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(id)
        .bind(user_id)
        .bind(subject_id)
        .bind(title)
        .bind(&req.content_md)
        .bind(req.status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        replace_tags(&mut tx, user_id, id, &req.tags).await?;
        insert_mistake_items(&mut tx, id, &req.mistake_items).await?;

        let note = self.fetch_on(&mut tx, user_id, id).await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "database",
            component = "notes",
            op = "create",
            user_id = %user_id,
            note_id = %id,
            mistake_count = note.mistake_items.len(),
            "Note created"
        );
        Ok(note)
    }

    async fn fetch(&self, user_id: Uuid, id: Uuid) -> Result<Note> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        self.fetch_on(&mut conn, user_id, id).await
    }

    async fn list(&self, user_id: Uuid, req: ListNotesRequest) -> Result<NotePage> {
        let req = req.normalized();
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;

        let count_sql = format!("SELECT COUNT(*) FROM notes n {}", NOTE_FILTER);
        let total: i64 = bind_filter(sqlx::query(&count_sql), user_id, &req.filter)
            .fetch_one(&mut *conn)
            .await
            .map_err(Error::Database)?
            .get(0);

        let list_sql = format!(
            "{} {} ORDER BY n.updated_at DESC, n.id DESC LIMIT $8 OFFSET $9",
            NOTE_SELECT, NOTE_FILTER
        );
        let rows = bind_filter(sqlx::query(&list_sql), user_id, &req.filter)
            .bind(req.per_page)
            .bind(req.offset())
            .fetch_all(&mut *conn)
            .await
            .map_err(Error::Database)?;

        let mut notes = rows.iter().map(note_from_row).collect::<Result<Vec<_>>>()?;
        hydrate(&mut conn, &mut notes).await?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "list",
            user_id = %user_id,
            result_count = notes.len(),
            total = total,
            "Listed notes"
        );

        Ok(NotePage {
            notes,
            total,
            page: req.page,
            pages: NotePage::page_count(total, req.per_page),
        })
    }

    async fn update(&self, user_id: Uuid, id: Uuid, req: UpdateNoteRequest) -> Result<Note> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM notes WHERE id = $1 AND user_id = $2)")
                .bind(id)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;
        if !exists {
            return Err(Error::NotFound("Note not found".to_string()));
        }

        // $1 = now, $2 = id, dynamic params start at $3
        let mut updates: Vec<String> = vec!["updated_at = $1".to_string()];
        let mut param_idx = 3;

        if req.title.is_some() {
            updates.push(format!("title = ${}", param_idx));
            param_idx += 1;
        }
        if req.content_md.is_some() {
            updates.push(format!("content_md = ${}", param_idx));
            param_idx += 1;
        }
        if req.status.is_some() {
            updates.push(format!("status = ${}", param_idx));
            param_idx += 1;
        }
        let subject_id = match req.subject.as_deref() {
            Some(name) => {
                updates.push(format!("subject_id = ${}", param_idx));
                Some(resolve_subject(&mut tx, user_id, Some(name)).await?)
            }
            None => None,
        };

        let sql = format!("UPDATE notes SET {} WHERE id = $2", updates.join(", "));
        let mut q = sqlx::query(&sql).bind(Utc::now()).bind(id);
        if let Some(title) = &req.title {
            q = q.bind(title);
        }
        if let Some(content) = &req.content_md {
            q = q.bind(content);
        }
        if let Some(status) = req.status {
            q = q.bind(status.as_str());
        }
        if let Some(subject_id) = subject_id {
            q = q.bind(subject_id);
        }
        q.execute(&mut *tx).await.map_err(Error::Database)?;

        if let Some(tags) = &req.tags {
            replace_tags(&mut tx, user_id, id, tags).await?;
        }

        let note = self.fetch_on(&mut tx, user_id, id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(note)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Note not found".to_string()));
        }
        info!(
            subsystem = "database",
            component = "notes",
            op = "delete",
            user_id = %user_id,
            note_id = %id,
            "Note deleted"
        );
        Ok(())
    }

    async fn list_matching(&self, user_id: Uuid, filter: &NoteFilter) -> Result<Vec<Note>> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        let sql = format!(
            "{} {} ORDER BY n.updated_at DESC, n.id DESC",
            NOTE_SELECT, NOTE_FILTER
        );
        let rows = bind_filter(sqlx::query(&sql), user_id, filter)
            .fetch_all(&mut *conn)
            .await
            .map_err(Error::Database)?;

        let mut notes = rows.iter().map(note_from_row).collect::<Result<Vec<_>>>()?;
        hydrate(&mut conn, &mut notes).await?;
        Ok(notes)
    }
}
