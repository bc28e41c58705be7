//! Model catalog handlers.
//!
//! Callers with their own OpenRouter key see the full catalogs; everyone
//! else gets the limited tier for both kinds.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use errata_core::ModelKind;
use errata_inference::available_models;

use crate::auth::RequireAuth;
use crate::AppState;

fn catalog(state: &AppState, auth: &RequireAuth, kind: ModelKind) -> Json<Value> {
    let (_, own_key) = state.client_for(&auth.user);
    Json(json!({"models": available_models(kind, own_key)}))
}

pub async fn vision_models(State(state): State<AppState>, auth: RequireAuth) -> Json<Value> {
    catalog(&state, &auth, ModelKind::Vision)
}

pub async fn chat_models(State(state): State<AppState>, auth: RequireAuth) -> Json<Value> {
    catalog(&state, &auth, ModelKind::Chat)
}
