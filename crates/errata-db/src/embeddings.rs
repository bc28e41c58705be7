//! Chunk embedding storage.
//!
//! Vectors are stored as raw little-endian `f32` bytes; similarity is
//! computed in process by `errata-search`.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use errata_core::{EmbeddingRepository, Error, Result, StoredChunk};

/// Serialize a vector as little-endian `f32` bytes.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f32` bytes. Trailing partial values are dropped.
pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// PostgreSQL implementation of EmbeddingRepository.
#[derive(Clone)]
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn replace_for_note(&self, note_id: Uuid, chunks: Vec<(String, Vec<f32>)>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM embeddings WHERE note_id = $1")
            .bind(note_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let count = chunks.len();
        for (index, (text, vector)) in chunks.into_iter().enumerate() {
            sqlx::query(
                "INSERT INTO embeddings (id, note_id, chunk_index, chunk_text, vector_blob)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(note_id)
            .bind(index as i32)
            .bind(text)
            .bind(vector_to_bytes(&vector))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "embeddings",
            op = "replace_for_note",
            note_id = %note_id,
            chunk_count = count,
            "Stored note chunks"
        );
        Ok(())
    }

    async fn load_for_user(
        &self,
        user_id: Uuid,
        note_ids: Option<&[Uuid]>,
    ) -> Result<Vec<StoredChunk>> {
        let ids: Option<Vec<Uuid>> = note_ids.map(<[Uuid]>::to_vec);
        let rows = sqlx::query(
            "SELECT e.note_id, e.chunk_text, e.vector_blob
             FROM embeddings e
             JOIN notes n ON n.id = e.note_id
             WHERE n.user_id = $1 AND ($2::uuid[] IS NULL OR e.note_id = ANY($2))
             ORDER BY e.note_id, e.chunk_index",
        )
        .bind(user_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector_blob");
                StoredChunk {
                    note_id: row.get("note_id"),
                    chunk_text: row.get("chunk_text"),
                    vector: bytes_to_vector(&blob),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_bytes_are_little_endian() {
        let bytes = vector_to_bytes(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(bytes_to_vector(&bytes), vec![1.0, -0.5]);
    }

    #[test]
    fn test_bytes_to_vector_ignores_partial_tail() {
        let mut bytes = vector_to_bytes(&[0.25]);
        bytes.push(0xFF);
        assert_eq!(bytes_to_vector(&bytes), vec![0.25]);
    }
}
