//! # errata-db
//!
//! PostgreSQL persistence for the errata notebook.
//!
//! This crate provides:
//! - Pool limits from the environment
//! - Repository implementations for every `errata-core` repository trait
//! - Embedded schema migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use errata_db::{Database, NoteRepository, CreateNoteRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/errata").await?;
//!     db.migrate().await?;
//!
//!     let note = db.notes.create(user_id, CreateNoteRequest {
//!         content_md: "x^2 = 4 so x = 2".to_string(),
//!         subject: Some("Math".to_string()),
//!         ..Default::default()
//!     }).await?;
//!
//!     println!("Created note: {}", note.id);
//!     Ok(())
//! }
//! ```
pub mod chats;
pub mod embeddings;
pub mod notes;
pub mod pool;
pub mod quizzes;
pub mod quotas;
pub mod sessions;
pub mod tags;
pub mod users;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use errata_core::*;

pub use chats::PgChatRepository;
pub use embeddings::{bytes_to_vector, vector_to_bytes, PgEmbeddingRepository};
pub use notes::PgNoteRepository;
pub use pool::PoolConfig;
pub use quizzes::PgQuizRepository;
pub use quotas::PgQuotaRepository;
pub use sessions::PgSessionRepository;
pub use tags::PgTagRepository;
pub use users::PgUserRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub users: PgUserRepository,
    pub sessions: PgSessionRepository,
    pub notes: PgNoteRepository,
    /// Subjects and tags.
    pub tags: PgTagRepository,
    pub quotas: PgQuotaRepository,
    pub quizzes: PgQuizRepository,
    pub chats: PgChatRepository,
    /// Note chunk vectors for retrieval.
    pub embeddings: PgEmbeddingRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            sessions: PgSessionRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            quotas: PgQuotaRepository::new(pool.clone()),
            quizzes: PgQuizRepository::new(pool.clone()),
            chats: PgChatRepository::new(pool.clone()),
            embeddings: PgEmbeddingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PoolConfig::default().connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = config.connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
