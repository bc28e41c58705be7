//! Quiz session repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{postgres::PgRow, PgConnection, Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use errata_core::{
    Error, NewQuizQuestion, QuizMode, QuizQuestion, QuizRepository, QuizScore, QuizSession, Result,
};

fn session_from_row(row: &PgRow) -> QuizSession {
    QuizSession {
        id: row.get("id"),
        mode: row.get("mode"),
        filters_json: row.get("filters_json"),
        score: row.get("score"),
        total: row.get("total"),
        created_at: row.get("created_at"),
        questions: Vec::new(),
    }
}

fn question_from_row(row: &PgRow) -> QuizQuestion {
    QuizQuestion {
        id: row.get("id"),
        note_id: row.get("note_id"),
        question_text: row.get("question_text"),
        question_image_path: row.get("question_image_path"),
        reference_answer: row.get("reference_answer"),
        user_answer: row.get("user_answer"),
        is_correct: row.get("is_correct"),
    }
}

const QUESTION_COLUMNS: &str = "id, session_id, note_id, question_text, question_image_path, \
     reference_answer, user_answer, is_correct";

async fn attach_questions(conn: &mut PgConnection, sessions: &mut [QuizSession]) -> Result<()> {
    if sessions.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
    let rows = sqlx::query(&format!(
        "SELECT {} FROM quiz_questions WHERE session_id = ANY($1) ORDER BY created_at, id",
        QUESTION_COLUMNS
    ))
    .bind(&ids)
    .fetch_all(conn)
    .await
    .map_err(Error::Database)?;

    let mut by_session: HashMap<Uuid, Vec<QuizQuestion>> = HashMap::new();
    for row in &rows {
        by_session
            .entry(row.get("session_id"))
            .or_default()
            .push(question_from_row(row));
    }
    for session in sessions.iter_mut() {
        session.questions = by_session.remove(&session.id).unwrap_or_default();
    }
    Ok(())
}

/// PostgreSQL implementation of QuizRepository.
#[derive(Clone)]
pub struct PgQuizRepository {
    pool: Pool<Postgres>,
}

impl PgQuizRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizRepository for PgQuizRepository {
    async fn create_session(
        &self,
        user_id: Uuid,
        mode: QuizMode,
        filters_json: Option<String>,
        questions: Vec<NewQuizQuestion>,
    ) -> Result<QuizSession> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let total = questions.len() as i32;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO quiz_sessions (id, user_id, mode, filters_json, score, total, created_at)
             VALUES ($1, $2, $3, $4, 0, $5, $6)",
        )
        .bind(id)
        .bind(user_id)
        .bind(mode.as_str())
        .bind(&filters_json)
        .bind(total)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let mut stored = Vec::with_capacity(questions.len());
        for (i, q) in questions.into_iter().enumerate() {
            let question_id = Uuid::now_v7();
            // Offset timestamps keep insertion order stable when sorting.
            let created_at = now + Duration::microseconds(i as i64);
            sqlx::query(
                "INSERT INTO quiz_questions
                    (id, session_id, note_id, question_text, question_image_path, reference_answer, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(question_id)
            .bind(id)
            .bind(q.note_id)
            .bind(&q.question_text)
            .bind(&q.question_image_path)
            .bind(&q.reference_answer)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            stored.push(QuizQuestion {
                id: question_id,
                note_id: q.note_id,
                question_text: q.question_text,
                question_image_path: q.question_image_path,
                reference_answer: q.reference_answer,
                user_answer: None,
                is_correct: None,
            });
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "quiz",
            component = "repository",
            op = "create_session",
            user_id = %user_id,
            session_id = %id,
            mode = mode.as_str(),
            result_count = total,
            "Quiz session created"
        );

        Ok(QuizSession {
            id,
            mode: mode.as_str().to_string(),
            filters_json,
            score: 0,
            total,
            created_at: now,
            questions: stored,
        })
    }

    async fn fetch(&self, user_id: Uuid, id: Uuid) -> Result<QuizSession> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        let row = sqlx::query(
            "SELECT id, mode, filters_json, score, total, created_at
             FROM quiz_sessions WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound("Quiz session not found".to_string()))?;

        let mut sessions = vec![session_from_row(&row)];
        attach_questions(&mut conn, &mut sessions).await?;
        sessions
            .pop()
            .ok_or_else(|| Error::NotFound("Quiz session not found".to_string()))
    }

    async fn list(&self, user_id: Uuid, limit: i64) -> Result<Vec<QuizSession>> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        let rows = sqlx::query(
            "SELECT id, mode, filters_json, score, total, created_at
             FROM quiz_sessions WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::Database)?;

        let mut sessions: Vec<QuizSession> = rows.iter().map(session_from_row).collect();
        attach_questions(&mut conn, &mut sessions).await?;
        Ok(sessions)
    }

    async fn fetch_question(&self, session_id: Uuid, question_id: Uuid) -> Result<QuizQuestion> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM quiz_questions WHERE id = $1 AND session_id = $2",
            QUESTION_COLUMNS
        ))
        .bind(question_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound("Question not found".to_string()))?;
        Ok(question_from_row(&row))
    }

    async fn record_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        user_answer: &str,
        is_correct: Option<bool>,
    ) -> Result<QuizScore> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            "UPDATE quiz_questions SET user_answer = $1, is_correct = $2
             WHERE id = $3 AND session_id = $4",
        )
        .bind(user_answer)
        .bind(is_correct)
        .bind(question_id)
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Question not found".to_string()));
        }

        let increment = i32::from(is_correct == Some(true));
        let row = sqlx::query(
            "UPDATE quiz_sessions SET score = score + $1 WHERE id = $2 RETURNING score, total",
        )
        .bind(increment)
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound("Quiz session not found".to_string()))?;

        tx.commit().await.map_err(Error::Database)?;

        Ok(QuizScore {
            score: row.get("score"),
            total: row.get("total"),
        })
    }
}
