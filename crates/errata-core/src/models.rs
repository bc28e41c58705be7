//! Core data models for the errata notebook.
//!
//! These types are shared across all errata crates and represent the
//! domain entities as they cross the repository and HTTP boundaries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// USER TYPES
// =============================================================================

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    /// Sealed OpenRouter key (see `errata_crypto::ApiKeyCipher`).
    #[serde(skip_serializing)]
    pub openrouter_api_key_enc: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether the user stored their own OpenRouter key.
    pub fn has_own_api_key(&self) -> bool {
        self.openrouter_api_key_enc
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }
}

/// Fields needed to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Authenticated principal resolved from a bearer session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPrincipal {
    User {
        user_id: Uuid,
        username: String,
        is_admin: bool,
    },
    Anonymous,
}

impl AuthPrincipal {
    /// Check if the principal is authenticated.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, AuthPrincipal::Anonymous)
    }

    /// Whether the principal holds admin rights.
    pub fn is_admin(&self) -> bool {
        matches!(self, AuthPrincipal::User { is_admin: true, .. })
    }

    /// The user id, if authenticated.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthPrincipal::User { user_id, .. } => Some(*user_id),
            AuthPrincipal::Anonymous => None,
        }
    }
}

// =============================================================================
// SUBJECT / TAG TYPES
// =============================================================================

/// A per-user subject such as "数学" or "Physics".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
}

/// A per-user free-form tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Whether a mistake (or the note as a whole) has a known correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SolveStatus {
    Solved,
    #[default]
    Unsolved,
}

impl SolveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Solved => "SOLVED",
            SolveStatus::Unsolved => "UNSOLVED",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SolveStatus {
    type Err = Error;

    /// Case-insensitive: "solved", "Solved" and "SOLVED" all parse.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "SOLVED" => Ok(SolveStatus::Solved),
            "UNSOLVED" => Ok(SolveStatus::Unsolved),
            other => Err(Error::InvalidInput(format!(
                "Invalid status '{}': expected SOLVED or UNSOLVED",
                other
            ))),
        }
    }
}

/// One detected error region attached to a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakeItem {
    pub id: Uuid,
    pub note_id: Uuid,
    pub crop_image_path: Option<String>,
    pub correction_image_path: Option<String>,
    pub diagram_image_path: Option<String>,
    pub ocr_question: String,
    pub ocr_answer: Option<String>,
    pub status: SolveStatus,
    pub bbox_json: Option<String>,
    pub confidence: f64,
    pub needs_user_edit: bool,
}

/// A mistake item as submitted by the client (usually a reviewed pipeline result).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MistakeItemInput {
    #[serde(default)]
    pub crop_image_path: Option<String>,
    #[serde(default)]
    pub correction_image_path: Option<String>,
    #[serde(default)]
    pub diagram_image_path: Option<String>,
    #[serde(default)]
    pub ocr_question: String,
    #[serde(default)]
    pub ocr_answer: Option<String>,
    #[serde(default)]
    pub status: SolveStatus,
    #[serde(default)]
    pub bbox_json: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub needs_user_edit: bool,
}

/// A note with its subject, tags and mistake items resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content_md: String,
    pub status: SolveStatus,
    pub subject: Option<String>,
    pub subject_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub tag_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub mistake_items: Vec<MistakeItem>,
}

/// One page of notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotePage {
    pub notes: Vec<Note>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

impl NotePage {
    /// Number of pages needed to hold `total` rows at `per_page` rows each.
    pub fn page_count(total: i64, per_page: i64) -> i64 {
        if total <= 0 || per_page <= 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        }
    }
}

// =============================================================================
// NOTE FILTERS
// =============================================================================

/// Filters shared by the note listing and quiz note selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    pub subject_id: Option<Uuid>,
    pub status: Option<SolveStatus>,
    /// A note must carry every one of these tags.
    pub tag_ids: Vec<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of title or content.
    pub q: Option<String>,
}

/// Quiz note filters as posted by the client and persisted on the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<String>,
}

impl QuizFilters {
    /// Resolve into a repository filter, validating status and dates.
    pub fn to_note_filter(&self) -> Result<NoteFilter> {
        Ok(NoteFilter {
            subject_id: self.subject_id,
            status: non_empty(self.status.as_deref())
                .map(SolveStatus::from_str)
                .transpose()?,
            tag_ids: self.tag_ids.clone(),
            date_from: non_empty(self.date_from.as_deref())
                .map(parse_flexible_datetime)
                .transpose()?,
            date_to: non_empty(self.date_to.as_deref())
                .map(parse_flexible_datetime)
                .transpose()?,
            q: None,
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an ISO-8601 timestamp leniently.
///
/// Accepts RFC 3339 (`2026-03-01T10:00:00Z`), a naive date-time
/// (`2026-03-01T10:00:00`, read as UTC) or a bare date (`2026-03-01`, midnight UTC).
pub fn parse_flexible_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::InvalidInput(format!("Invalid date: '{}'", s)))
}

// =============================================================================
// QUOTA TYPES
// =============================================================================

/// A metered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaResource {
    Chat,
    Images,
    Quizzes,
}

impl QuotaResource {
    pub const ALL: [QuotaResource; 3] = [
        QuotaResource::Chat,
        QuotaResource::Images,
        QuotaResource::Quizzes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaResource::Chat => "chat",
            QuotaResource::Images => "images",
            QuotaResource::Quizzes => "quizzes",
        }
    }

    /// Plural noun used in low-quota warnings.
    pub fn plural(&self) -> &'static str {
        match self {
            QuotaResource::Chat => "chats",
            QuotaResource::Images => "images",
            QuotaResource::Quizzes => "quizzes",
        }
    }
}

impl fmt::Display for QuotaResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's quota row. Refresh and consumption logic lives in [`crate::quota`].
#[derive(Debug, Clone, PartialEq)]
pub struct Quota {
    pub user_id: Uuid,
    pub remaining_chat: i32,
    pub remaining_images: i32,
    pub remaining_quizzes: i32,
    pub max_chat: i32,
    pub max_images: i32,
    pub max_quizzes: i32,
    pub refresh_interval_hours: i32,
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Remaining counters, as shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRemaining {
    pub remaining_chat: i32,
    pub remaining_images: i32,
    pub remaining_quizzes: i32,
}

/// Full quota view, as shown to admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDetail {
    pub remaining_chat: i32,
    pub remaining_images: i32,
    pub remaining_quizzes: i32,
    pub max_chat: i32,
    pub max_images: i32,
    pub max_quizzes: i32,
    pub refresh_interval_hours: i32,
}

/// Partial admin update; absent fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUpdate {
    #[serde(default)]
    pub max_chat: Option<i32>,
    #[serde(default)]
    pub max_images: Option<i32>,
    #[serde(default)]
    pub max_quizzes: Option<i32>,
    #[serde(default)]
    pub remaining_chat: Option<i32>,
    #[serde(default)]
    pub remaining_images: Option<i32>,
    #[serde(default)]
    pub remaining_quizzes: Option<i32>,
    #[serde(default)]
    pub refresh_interval_hours: Option<i32>,
}

/// Counters granted to newly created quota rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDefaults {
    pub chat: i32,
    pub images: i32,
    pub quizzes: i32,
    pub refresh_hours: i32,
}

impl Default for QuotaDefaults {
    fn default() -> Self {
        Self {
            chat: defaults::QUOTA_CHAT,
            images: defaults::QUOTA_IMAGES,
            quizzes: defaults::QUOTA_QUIZZES,
            refresh_hours: defaults::QUOTA_REFRESH_HOURS,
        }
    }
}

impl QuotaDefaults {
    /// The same value for every counter (used for the seeded admin).
    pub fn uniform(value: i32, refresh_hours: i32) -> Self {
        Self {
            chat: value,
            images: value,
            quizzes: value,
            refresh_hours,
        }
    }
}

// =============================================================================
// QUIZ TYPES
// =============================================================================

/// How quiz questions are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizMode {
    /// Replay the stored mistake questions verbatim.
    #[default]
    Original,
    /// Ask the chat model for new questions on the same concepts.
    Generated,
}

impl QuizMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizMode::Original => "original",
            QuizMode::Generated => "generated",
        }
    }
}

/// A stored quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: Uuid,
    pub note_id: Option<Uuid>,
    pub question_text: String,
    pub question_image_path: Option<String>,
    pub reference_answer: Option<String>,
    pub user_answer: Option<String>,
    pub is_correct: Option<bool>,
}

/// A question ready to be inserted with its session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuizQuestion {
    pub note_id: Option<Uuid>,
    pub question_text: String,
    pub question_image_path: Option<String>,
    pub reference_answer: Option<String>,
}

/// A quiz session with its questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSession {
    pub id: Uuid,
    pub mode: String,
    pub filters_json: Option<String>,
    pub score: i32,
    pub total: i32,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<QuizQuestion>,
}

/// Score after recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizScore {
    pub score: i32,
    pub total: i32,
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Role of a chat participant.
pub mod role {
    pub const SYSTEM: &str = "system";
    pub const USER: &str = "user";
    pub const ASSISTANT: &str = "assistant";
}

/// A chat thread header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A thread together with its messages in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadWithMessages {
    #[serde(flatten)]
    pub thread: ChatThread,
    pub messages: Vec<ThreadMessage>,
}

/// A role/content pair sent to a completion backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(role::SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(role::USER, content)
    }
}

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// A stored note chunk with its hashed vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub note_id: Uuid,
    pub chunk_text: String,
    pub vector: Vec<f32>,
}

/// A chunk scored against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_text: String,
    pub note_id: Uuid,
    pub similarity: f32,
}

// =============================================================================
// MODEL CATALOG
// =============================================================================

/// A selectable OpenRouter model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
}

/// Which catalog a model request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Chat,
    Vision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn user_with_key(key: Option<&str>) -> User {
        User {
            id: Uuid::nil(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            is_admin: false,
            openrouter_api_key_enc: key.map(String::from),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_has_own_api_key() {
        assert!(!user_with_key(None).has_own_api_key());
        assert!(!user_with_key(Some("")).has_own_api_key());
        assert!(user_with_key(Some("sealed")).has_own_api_key());
    }

    #[test]
    fn test_user_serialization_hides_secrets() {
        let json = serde_json::to_value(user_with_key(Some("sealed"))).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("openrouter_api_key_enc").is_none());
        assert_eq!(json["username"], "alice");
    }

    #[test]
    fn test_principal_accessors() {
        let id = Uuid::now_v7();
        let p = AuthPrincipal::User {
            user_id: id,
            username: "bob".into(),
            is_admin: true,
        };
        assert!(p.is_authenticated());
        assert!(p.is_admin());
        assert_eq!(p.user_id(), Some(id));

        assert!(!AuthPrincipal::Anonymous.is_authenticated());
        assert!(!AuthPrincipal::Anonymous.is_admin());
        assert_eq!(AuthPrincipal::Anonymous.user_id(), None);
    }

    #[test]
    fn test_solve_status_parse_case_insensitive() {
        assert_eq!("solved".parse::<SolveStatus>().unwrap(), SolveStatus::Solved);
        assert_eq!(" Unsolved ".parse::<SolveStatus>().unwrap(), SolveStatus::Unsolved);
        assert!("maybe".parse::<SolveStatus>().is_err());
    }

    #[test]
    fn test_solve_status_serde_uppercase() {
        assert_eq!(serde_json::to_string(&SolveStatus::Solved).unwrap(), "\"SOLVED\"");
        let s: SolveStatus = serde_json::from_str("\"UNSOLVED\"").unwrap();
        assert_eq!(s, SolveStatus::Unsolved);
    }

    #[test]
    fn test_mistake_item_input_defaults() {
        let input: MistakeItemInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.ocr_question, "");
        assert_eq!(input.status, SolveStatus::Unsolved);
        assert_eq!(input.confidence, 0.0);
        assert!(!input.needs_user_edit);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(NotePage::page_count(0, 20), 0);
        assert_eq!(NotePage::page_count(1, 20), 1);
        assert_eq!(NotePage::page_count(20, 20), 1);
        assert_eq!(NotePage::page_count(21, 20), 2);
        assert_eq!(NotePage::page_count(5, 0), 0);
    }

    #[test]
    fn test_parse_flexible_datetime_variants() {
        let rfc = parse_flexible_datetime("2026-03-01T10:30:00Z").unwrap();
        assert_eq!(rfc.hour(), 10);

        let offset = parse_flexible_datetime("2026-03-01T10:30:00+08:00").unwrap();
        assert_eq!(offset.hour(), 2);

        let naive = parse_flexible_datetime("2026-03-01T10:30:00").unwrap();
        assert_eq!(naive.minute(), 30);

        let date = parse_flexible_datetime("2026-03-01").unwrap();
        assert_eq!(date.day(), 1);
        assert_eq!(date.hour(), 0);

        assert!(parse_flexible_datetime("yesterday").is_err());
    }

    #[test]
    fn test_quiz_filters_to_note_filter() {
        let filters = QuizFilters {
            subject_id: None,
            status: Some("solved".into()),
            tag_ids: vec![Uuid::nil()],
            date_from: Some("2026-01-01".into()),
            date_to: Some("".into()),
        };
        let nf = filters.to_note_filter().unwrap();
        assert_eq!(nf.status, Some(SolveStatus::Solved));
        assert_eq!(nf.tag_ids, vec![Uuid::nil()]);
        assert!(nf.date_from.is_some());
        assert!(nf.date_to.is_none());
    }

    #[test]
    fn test_quiz_filters_reject_bad_status() {
        let filters = QuizFilters {
            status: Some("pending".into()),
            ..Default::default()
        };
        assert!(matches!(
            filters.to_note_filter(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_quiz_mode_serde() {
        let m: QuizMode = serde_json::from_str("\"generated\"").unwrap();
        assert_eq!(m, QuizMode::Generated);
        assert_eq!(QuizMode::default().as_str(), "original");
    }

    #[test]
    fn test_quota_resource_names() {
        assert_eq!(QuotaResource::Chat.as_str(), "chat");
        assert_eq!(QuotaResource::Chat.plural(), "chats");
        assert_eq!(QuotaResource::Images.to_string(), "images");
    }

    #[test]
    fn test_thread_with_messages_flattens() {
        let t = ThreadWithMessages {
            thread: ChatThread {
                id: Uuid::nil(),
                title: "New Chat".into(),
                created_at: Utc::now(),
            },
            messages: vec![],
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["title"], "New Chat");
        assert!(json["messages"].as_array().unwrap().is_empty());
    }
}
