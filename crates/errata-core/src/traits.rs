//! Core traits for errata abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.
//! Every repository method that touches user-owned rows takes the owning
//! `user_id` and never returns another user's data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTE REPOSITORY TRAITS
// =============================================================================

/// Request for creating a note with its subject, tags and mistake items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content_md: String,
    #[serde(default)]
    pub status: SolveStatus,
    /// Subject name; created on first use. Blank means no subject.
    #[serde(default)]
    pub subject: Option<String>,
    /// Tag names; created on first use. Blank names are skipped.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mistake_items: Vec<MistakeItemInput>,
}

/// Partial note update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content_md: Option<String>,
    #[serde(default)]
    pub status: Option<SolveStatus>,
    /// `Some("")` clears the subject.
    #[serde(default)]
    pub subject: Option<String>,
    /// Replaces the whole tag set when present.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Request for listing notes.
#[derive(Debug, Clone)]
pub struct ListNotesRequest {
    pub filter: NoteFilter,
    /// 1-based page number.
    pub page: i64,
    pub per_page: i64,
}

impl Default for ListNotesRequest {
    fn default() -> Self {
        Self {
            filter: NoteFilter::default(),
            page: 1,
            per_page: defaults::NOTES_PER_PAGE,
        }
    }
}

impl ListNotesRequest {
    /// Clamp page to >= 1 and per_page into 1..=NOTES_PER_PAGE_MAX.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.per_page = self.per_page.clamp(1, defaults::NOTES_PER_PAGE_MAX);
        self
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Repository for note operations.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a note, resolving subject and tags, in one transaction.
    async fn create(&self, user_id: Uuid, req: CreateNoteRequest) -> Result<Note>;

    /// Fetch a note owned by `user_id`.
    async fn fetch(&self, user_id: Uuid, id: Uuid) -> Result<Note>;

    /// List notes, newest update first.
    async fn list(&self, user_id: Uuid, req: ListNotesRequest) -> Result<NotePage>;

    /// Apply a partial update and bump `updated_at`.
    async fn update(&self, user_id: Uuid, id: Uuid, req: UpdateNoteRequest) -> Result<Note>;

    /// Delete a note with its mistake items, tag links and embeddings.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<()>;

    /// Every note matching `filter`, unpaginated (quiz selection).
    async fn list_matching(&self, user_id: Uuid, filter: &NoteFilter) -> Result<Vec<Note>>;
}

// =============================================================================
// SUBJECT / TAG REPOSITORY TRAITS
// =============================================================================

/// Repository for per-user subjects and tags.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// List subjects ordered by name.
    async fn list_subjects(&self, user_id: Uuid) -> Result<Vec<Subject>>;

    /// List tags ordered by name.
    async fn list_tags(&self, user_id: Uuid) -> Result<Vec<Tag>>;

    /// Return the subject id for `name`, creating it if needed.
    async fn get_or_create_subject(&self, user_id: Uuid, name: &str) -> Result<Uuid>;

    /// Return the tag id for `name`, creating it if needed.
    async fn get_or_create_tag(&self, user_id: Uuid, name: &str) -> Result<Uuid>;
}

// =============================================================================
// USER / SESSION REPOSITORY TRAITS
// =============================================================================

/// Repository for accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user together with a quota row granting `quota`.
    async fn create(&self, user: NewUser, quota: QuotaDefaults) -> Result<User>;

    async fn fetch(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn username_taken(&self, username: &str) -> Result<bool>;

    async fn email_taken(&self, email: &str) -> Result<bool>;

    /// Store (or with `None`, clear) the sealed OpenRouter key.
    async fn set_api_key(&self, id: Uuid, sealed: Option<&str>) -> Result<()>;

    /// All users, oldest first.
    async fn list(&self) -> Result<Vec<User>>;
}

/// Repository for bearer session tokens. Only token hashes are stored.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// The owning user of an unexpired session.
    async fn resolve(&self, token_hash: &str) -> Result<Option<User>>;

    async fn revoke(&self, token_hash: &str) -> Result<()>;

    /// Delete expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

// =============================================================================
// QUOTA REPOSITORY TRAITS
// =============================================================================

/// Repository for per-user quotas.
///
/// Reads that show counters apply any due refresh first and persist it.
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// The raw row, without refreshing.
    async fn fetch(&self, user_id: Uuid) -> Result<Option<Quota>>;

    /// Remaining counters after refresh; zeros when the user has no row.
    async fn remaining(&self, user_id: Uuid, default_hours: i32) -> Result<QuotaRemaining>;

    /// Atomically refresh, check and decrement. Returns false when denied.
    async fn check_and_decrement(
        &self,
        user_id: Uuid,
        resource: QuotaResource,
        count: i32,
        default_hours: i32,
    ) -> Result<bool>;

    /// Apply an admin update, creating the row from `defaults` if missing.
    async fn update(&self, user_id: Uuid, update: &QuotaUpdate, defaults: QuotaDefaults) -> Result<Quota>;
}

// =============================================================================
// QUIZ REPOSITORY TRAITS
// =============================================================================

/// Repository for quiz sessions.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Insert a session and its questions atomically; `total` is the question count.
    async fn create_session(
        &self,
        user_id: Uuid,
        mode: QuizMode,
        filters_json: Option<String>,
        questions: Vec<NewQuizQuestion>,
    ) -> Result<QuizSession>;

    async fn fetch(&self, user_id: Uuid, id: Uuid) -> Result<QuizSession>;

    /// Newest sessions first.
    async fn list(&self, user_id: Uuid, limit: i64) -> Result<Vec<QuizSession>>;

    async fn fetch_question(&self, session_id: Uuid, question_id: Uuid) -> Result<QuizQuestion>;

    /// Store the answer and, when correct, increment the session score.
    async fn record_answer(
        &self,
        session_id: Uuid,
        question_id: Uuid,
        user_answer: &str,
        is_correct: Option<bool>,
    ) -> Result<QuizScore>;
}

// =============================================================================
// CHAT REPOSITORY TRAITS
// =============================================================================

/// Repository for chat threads and messages.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Newest threads first.
    async fn list_threads(&self, user_id: Uuid) -> Result<Vec<ChatThread>>;

    async fn create_thread(&self, user_id: Uuid, title: &str) -> Result<ChatThread>;

    async fn fetch_thread(&self, user_id: Uuid, id: Uuid) -> Result<ChatThread>;

    async fn delete_thread(&self, user_id: Uuid, id: Uuid) -> Result<()>;

    async fn rename_thread(&self, thread_id: Uuid, title: &str) -> Result<()>;

    /// Messages in chronological order.
    async fn messages(&self, thread_id: Uuid) -> Result<Vec<ThreadMessage>>;

    async fn append(&self, thread_id: Uuid, role: &str, content: &str) -> Result<ThreadMessage>;

    /// Rewrite a user message and drop every message after it.
    async fn edit_user_message(
        &self,
        thread_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<ThreadMessage>;

    /// Delete the latest assistant message. Returns false if there was none.
    async fn delete_last_assistant(&self, thread_id: Uuid) -> Result<bool>;

    async fn last_user_message(&self, thread_id: Uuid) -> Result<Option<ThreadMessage>>;
}

// =============================================================================
// EMBEDDING REPOSITORY TRAITS
// =============================================================================

/// Repository for hashed note chunks.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Replace every stored chunk of a note.
    async fn replace_for_note(&self, note_id: Uuid, chunks: Vec<(String, Vec<f32>)>) -> Result<()>;

    /// All chunks of the user's notes, optionally restricted to `note_ids`.
    async fn load_for_user(&self, user_id: Uuid, note_ids: Option<&[Uuid]>) -> Result<Vec<StoredChunk>>;
}

// =============================================================================
// COMPLETION BACKEND TRAITS
// =============================================================================

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    /// Conversational defaults.
    pub fn chat() -> Self {
        Self::new(defaults::CHAT_TEMPERATURE, defaults::CHAT_MAX_TOKENS)
    }

    /// Vision defaults (lower temperature, larger budget for JSON transcripts).
    pub fn vision() -> Self {
        Self::new(defaults::VISION_TEMPERATURE, defaults::VISION_MAX_TOKENS)
    }
}

/// A chat/vision completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Non-streaming chat completion returning the reply text.
    async fn chat_completion(
        &self,
        messages: &[PromptMessage],
        model: &str,
        options: CompletionOptions,
    ) -> Result<String>;

    /// Send base64 PNG images with a text prompt to a vision model.
    async fn vision_completion(
        &self,
        images_b64: &[String],
        prompt: &str,
        model: &str,
        options: CompletionOptions,
    ) -> Result<String>;
}
