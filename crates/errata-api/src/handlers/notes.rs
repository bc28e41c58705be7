//! Note, subject and tag handlers.
//!
//! Every write re-indexes the note for chat retrieval. Indexing is best
//! effort and never fails the request.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use errata_core::{
    CreateNoteRequest, Note, NotePage, NoteRepository, TagRepository, UpdateNoteRequest,
};

use crate::auth::RequireAuth;
use crate::query_types::NotesQuery;
use crate::{ApiError, AppState};

/// List the user's notes, newest update first.
///
/// Filters: `subject_id`, `status`, `tag_ids` (comma list, all required),
/// `date_from`, `date_to`, `q`; paginated by `page` and `per_page`.
pub async fn list_notes(
    State(state): State<AppState>,
    auth: RequireAuth,
    Query(query): Query<NotesQuery>,
) -> Result<Json<NotePage>, ApiError> {
    let req = query.into_request()?;
    let page = state.db.notes.list(auth.user.id, req).await?;
    Ok(Json(page))
}

pub async fn create_note(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    let note = state.db.notes.create(auth.user.id, req).await?;
    state.index.index_note_best_effort(&note).await;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_note(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<Note>, ApiError> {
    Ok(Json(state.db.notes.fetch(auth.user.id, id).await?))
}

pub async fn update_note(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<Json<Note>, ApiError> {
    let note = state.db.notes.update(auth.user.id, id, req).await?;
    state.index.index_note_best_effort(&note).await;
    Ok(Json(note))
}

pub async fn delete_note(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.db.notes.delete(auth.user.id, id).await?;
    Ok(Json(json!({"message": "Note deleted"})))
}

pub async fn list_subjects(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let subjects = state.db.tags.list_subjects(auth.user.id).await?;
    Ok(Json(json!({"subjects": subjects})))
}

pub async fn list_tags(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let tags = state.db.tags.list_tags(auth.user.id).await?;
    Ok(Json(json!({"tags": tags})))
}
