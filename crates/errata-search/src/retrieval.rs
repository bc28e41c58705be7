//! Note indexing and similarity retrieval.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use errata_core::{
    defaults::RAG_TOP_K, EmbeddingRepository, Note, Result, RetrievedChunk, StoredChunk,
};
use errata_db::Database;

use crate::chunking::note_chunks;
use crate::embedding::{cosine_similarity, text_to_vector};

/// Header placed above retrieved chunks in the chat system prompt.
pub const CONTEXT_HEADER: &str = "Relevant study notes for context:";

/// Separator between retrieved chunks.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Score `chunks` against `query_vec` and keep the best `top_k`, highest first.
pub fn rank_chunks(query_vec: &[f32], chunks: Vec<StoredChunk>, top_k: usize) -> Vec<RetrievedChunk> {
    let mut scored: Vec<RetrievedChunk> = chunks
        .into_iter()
        .map(|c| RetrievedChunk {
            similarity: cosine_similarity(query_vec, &c.vector),
            chunk_text: c.chunk_text,
            note_id: c.note_id,
        })
        .collect();
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

/// Render retrieved chunks as `[Note #id] chunk` blocks.
///
/// Returns `None` when nothing was retrieved so callers can omit the section.
pub fn format_context(chunks: &[RetrievedChunk]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let body = chunks
        .iter()
        .map(|c| format!("[Note #{}] {}", c.note_id, c.chunk_text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    Some(format!("{}\n{}", CONTEXT_HEADER, body))
}

/// Index and search over a user's note chunks.
#[derive(Clone)]
pub struct NoteIndex {
    embeddings: Arc<dyn EmbeddingRepository>,
}

impl NoteIndex {
    pub fn new(embeddings: Arc<dyn EmbeddingRepository>) -> Self {
        Self { embeddings }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(Arc::new(db.embeddings.clone()))
    }

    /// Replace every stored chunk of `note`. Returns the number of chunks.
    pub async fn index_note(&self, note: &Note) -> Result<usize> {
        let chunks: Vec<(String, Vec<f32>)> = note_chunks(note)
            .into_iter()
            .map(|text| {
                let vector = text_to_vector(&text);
                (text, vector)
            })
            .collect();
        let count = chunks.len();
        self.embeddings.replace_for_note(note.id, chunks).await?;
        Ok(count)
    }

    /// Index a note, logging instead of failing. Note writes never fail on indexing.
    pub async fn index_note_best_effort(&self, note: &Note) {
        if let Err(e) = self.index_note(note).await {
            warn!(
                subsystem = "search",
                component = "index",
                op = "index_note",
                note_id = %note.id,
                error = %e,
                "Failed to index note"
            );
        }
    }

    /// Top `top_k` chunks of the user's notes for `query`.
    ///
    /// An empty `note_ids` slice is treated as no restriction.
    pub async fn retrieve(
        &self,
        user_id: Uuid,
        query: &str,
        note_ids: Option<&[Uuid]>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let start = Instant::now();
        let note_ids = note_ids.filter(|ids| !ids.is_empty());
        let chunks = self.embeddings.load_for_user(user_id, note_ids).await?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let scanned = chunks.len();
        let results = rank_chunks(&text_to_vector(query), chunks, top_k);

        debug!(
            subsystem = "search",
            component = "retrieval",
            op = "retrieve",
            user_id = %user_id,
            chunk_count = scanned,
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Retrieved note chunks"
        );
        Ok(results)
    }

    /// [`NoteIndex::retrieve`] with the default `top_k`.
    pub async fn retrieve_default(
        &self,
        user_id: Uuid,
        query: &str,
        note_ids: Option<&[Uuid]>,
    ) -> Result<Vec<RetrievedChunk>> {
        self.retrieve(user_id, query, note_ids, RAG_TOP_K).await
    }
}
