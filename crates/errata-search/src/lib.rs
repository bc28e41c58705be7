//! # errata-search
//!
//! Lightweight retrieval over a user's study notes.
//!
//! This crate provides:
//! - Deterministic hashed trigram/word vectors (no model call)
//! - Note chunking (paragraphs, mistake OCR text, title/subject/tags)
//! - Cosine-similarity retrieval and chat context formatting
//!
//! ## Example
//!
//! ```ignore
//! use errata_search::NoteIndex;
//! use errata_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let index = NoteIndex::from_database(&db);
//!
//! index.index_note(&note).await?;
//! let hits = index.retrieve(user_id, "projectile motion", None, 8).await?;
//! let context = errata_search::format_context(&hits);
//! ```

pub mod chunking;
pub mod embedding;
pub mod retrieval;

pub use chunking::note_chunks;
pub use embedding::{cosine_similarity, normalize, text_to_vector, text_to_vector_with_dim, token_hash};
pub use retrieval::{format_context, rank_chunks, NoteIndex, CONTEXT_HEADER, CONTEXT_SEPARATOR};
