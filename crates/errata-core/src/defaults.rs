//! Centralized default constants for the errata notebook.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Environment overrides live in the API configuration layer.

// =============================================================================
// QUOTAS
// =============================================================================

/// Chat messages granted per refresh window to a new user.
pub const QUOTA_CHAT: i32 = 50;

/// Images granted per refresh window to a new user.
pub const QUOTA_IMAGES: i32 = 20;

/// Quizzes granted per refresh window to a new user.
pub const QUOTA_QUIZZES: i32 = 10;

/// Hours between automatic quota refills.
pub const QUOTA_REFRESH_HOURS: i32 = 6;

/// Remaining count at or below which a low-quota warning is shown.
pub const QUOTA_WARNING_THRESHOLD: i32 = 3;

/// Counter value granted to the seeded admin account.
pub const ADMIN_QUOTA: i32 = 9999;

// =============================================================================
// EMBEDDING / RETRIEVAL
// =============================================================================

/// Dimension of the hashed bag-of-words/trigram vectors.
pub const EMBED_DIMENSION: usize = 384;

/// Weight added per character trigram.
pub const TRIGRAM_WEIGHT: f32 = 1.0;

/// Weight added per whitespace-delimited word.
pub const WORD_WEIGHT: f32 = 2.0;

/// Paragraphs at or below this many characters are not indexed.
pub const MIN_PARAGRAPH_CHARS: usize = 20;

/// Chunks injected into a chat prompt.
pub const RAG_TOP_K: usize = 8;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default notes per page.
pub const NOTES_PER_PAGE: i64 = 20;

/// Upper bound on notes per page.
pub const NOTES_PER_PAGE_MAX: i64 = 100;

/// Quiz sessions returned by the history listing.
pub const QUIZ_HISTORY_LIMIT: i64 = 50;

/// Notes sampled into a quiz when the request omits `count`.
pub const QUIZ_QUESTION_COUNT: usize = 5;

// =============================================================================
// NOTES / CHAT
// =============================================================================

/// Title given to notes created without one.
pub const NOTE_TITLE: &str = "Untitled";

/// Title given to chat threads created without one.
pub const THREAD_TITLE: &str = "New Chat";

/// Characters of the first message used as an automatic thread title.
pub const THREAD_TITLE_CHARS: usize = 50;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default max requests per rate-limit window.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate-limit window length in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// CORS preflight cache duration in seconds.
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Request body cap, sized for multi-photo uploads.
pub const MAX_BODY_SIZE_BYTES: usize = 32 * 1024 * 1024;

/// Bearer session lifetime in hours (30 days).
pub const SESSION_TTL_HOURS: i64 = 720;

/// Minimum accepted password length.
pub const PASSWORD_MIN_LEN: usize = 6;

/// Default upload directory (relative to the working directory).
pub const UPLOAD_DIR: &str = "./uploads";

/// Subdirectory of the upload directory holding crops.
pub const CROPS_SUBDIR: &str = "crops";

// =============================================================================
// OPENROUTER
// =============================================================================

/// OpenRouter API base URL.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Referer sent with every OpenRouter request for app attribution.
pub const OPENROUTER_REFERER: &str = "https://error-notebook.local";

/// Application title sent with every OpenRouter request.
pub const OPENROUTER_TITLE: &str = "Digital Error Notebook";

/// Timeout for chat completions.
pub const CHAT_TIMEOUT_SECS: u64 = 120;

/// Timeout for vision completions (multi-image payloads are slow).
pub const VISION_TIMEOUT_SECS: u64 = 180;

/// Default chat sampling temperature.
pub const CHAT_TEMPERATURE: f32 = 0.7;

/// Default chat completion token cap.
pub const CHAT_MAX_TOKENS: u32 = 4096;

/// Default vision sampling temperature.
pub const VISION_TEMPERATURE: f32 = 0.3;

/// Default vision completion token cap.
pub const VISION_MAX_TOKENS: u32 = 8192;

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "qwen/qwen3.5-397b-a17b";

/// Default vision model.
pub const DEFAULT_VISION_MODEL: &str = "qwen/qwen3.5-397b-a17b";

// =============================================================================
// VISION PIPELINE
// =============================================================================

/// Longest image side sent to the vision model.
pub const VISION_MAX_DIM: u32 = 2048;

/// Confidence below which an item is flagged for manual editing.
pub const NEEDS_EDIT_CONFIDENCE: f64 = 0.6;

/// Confidence assumed when the detector omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_defaults_positive() {
        assert!(QUOTA_CHAT > 0);
        assert!(QUOTA_IMAGES > 0);
        assert!(QUOTA_QUIZZES > 0);
        assert!(QUOTA_REFRESH_HOURS > 0);
    }

    #[test]
    fn test_admin_quota_exceeds_user_defaults() {
        assert!(ADMIN_QUOTA > QUOTA_CHAT);
        assert!(ADMIN_QUOTA > QUOTA_IMAGES);
        assert!(ADMIN_QUOTA > QUOTA_QUIZZES);
    }

    #[test]
    fn test_per_page_bounds() {
        assert!(NOTES_PER_PAGE <= NOTES_PER_PAGE_MAX);
    }

    #[test]
    fn test_vision_allows_more_time_than_chat() {
        assert!(VISION_TIMEOUT_SECS > CHAT_TIMEOUT_SECS);
    }
}
