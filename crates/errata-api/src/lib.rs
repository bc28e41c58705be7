//! errata-api - HTTP API for the errata study notebook.
//!
//! The binary in `main.rs` loads configuration, connects the database and
//! serves [`router`]. Tests build the same router around a lazy pool and a
//! mock completion provider.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query_types;
pub mod state;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;

use handlers::{admin, auth as account, chat, files, models, notes, quiz, upload};
use middleware::rate_limit_middleware;

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// All routes with the shared middleware stack.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let allowed_origins = state.config.allowed_origins.clone();

    Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/auth/register", post(account::register))
        .route("/auth/login", post(account::login))
        .route("/auth/logout", post(account::logout))
        .route("/auth/me", get(account::me))
        .route("/auth/api-key", put(account::update_api_key))
        // Notes
        .route("/api/notes", get(notes::list_notes).post(notes::create_note))
        .route(
            "/api/notes/:id",
            get(notes::get_note)
                .put(notes::update_note)
                .delete(notes::delete_note),
        )
        .route("/api/subjects", get(notes::list_subjects))
        .route("/api/tags", get(notes::list_tags))
        // Upload and extraction
        .route("/api/upload", post(upload::upload_images))
        // Quiz
        .route("/api/quiz/start", post(quiz::start_quiz))
        .route("/api/quiz/sessions", get(quiz::list_sessions))
        .route("/api/quiz/:id", get(quiz::get_session))
        .route("/api/quiz/:id/answer", post(quiz::submit_answer))
        // Chat
        .route(
            "/api/chat/threads",
            get(chat::list_threads).post(chat::create_thread),
        )
        .route("/api/chat/threads/:id", axum::routing::delete(chat::delete_thread))
        .route(
            "/api/chat/threads/:id/messages",
            get(chat::get_messages).post(chat::send_message),
        )
        .route(
            "/api/chat/threads/:id/messages/:msg_id",
            put(chat::edit_message),
        )
        .route("/api/chat/threads/:id/regenerate", post(chat::regenerate))
        // Model catalogs
        .route("/api/models/vision", get(models::vision_models))
        .route("/api/models/chat", get(models::chat_models))
        // Admin
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id/quota", put(admin::update_user_quota))
        // Stored files
        .route("/uploads/*path", get(files::serve_upload))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(allowed_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
