//! Chat threads with retrieval over the user's notes.
//!
//! Replies stream as SSE `data:` frames carrying `{"content": delta}`, an
//! `{"error": ...}` frame on failure, and a final `[DONE]`. The assistant
//! message is stored once the stream ends with a non-empty reply.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use errata_core::defaults::{THREAD_TITLE, THREAD_TITLE_CHARS};
use errata_core::{
    role, ChatRepository, ChatThread, CompletionOptions, ModelKind, PromptMessage, QuotaResource,
    ThreadMessage, ThreadWithMessages, User,
};
use errata_inference::prompts::chat_system_prompt;
use errata_inference::{resolve_model, StreamingCompletion};
use errata_search::format_context;

use crate::auth::RequireAuth;
use crate::middleware::charge_quota;
use crate::{ApiError, AppState};

const CONTENT_REQUIRED: &str = "Message content is required";
const NOTHING_TO_REGENERATE: &str = "No user message to regenerate from";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateThreadRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub note_ids: Option<Vec<Uuid>>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegenerateRequest {
    pub model: Option<String>,
    pub note_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EditMessageRequest {
    pub content: String,
}

/// Title for a thread named after its first message.
pub fn thread_title(content: &str) -> String {
    let trimmed = content.trim();
    let mut title: String = trimmed.chars().take(THREAD_TITLE_CHARS).collect();
    if trimmed.chars().count() > THREAD_TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// System prompt (with optional note context) followed by the whole history.
pub fn build_prompt(context: Option<&str>, history: &[ThreadMessage]) -> Vec<PromptMessage> {
    std::iter::once(PromptMessage::system(chat_system_prompt(context)))
        .chain(
            history
                .iter()
                .map(|m| PromptMessage::new(m.role.clone(), m.content.clone())),
        )
        .collect()
}

/// Retrieve note context for `query`. Retrieval failures only drop the context.
async fn note_context(
    state: &AppState,
    user_id: Uuid,
    query: &str,
    note_ids: Option<&[Uuid]>,
) -> Option<String> {
    match state.index.retrieve_default(user_id, query, note_ids).await {
        Ok(chunks) => {
            debug!(
                subsystem = "api",
                component = "chat",
                user_id = %user_id,
                result_count = chunks.len(),
                "Retrieved note context"
            );
            format_context(&chunks)
        }
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "chat",
                user_id = %user_id,
                error = %e,
                "Note retrieval failed, answering without context"
            );
            None
        }
    }
}

fn frame(payload: Value) -> Result<Event, Infallible> {
    Ok(Event::default().data(payload.to_string()))
}

/// Stream a reply over SSE and store it when the stream ends.
fn stream_reply(
    state: AppState,
    thread_id: Uuid,
    client: Arc<dyn StreamingCompletion>,
    model: String,
    messages: Vec<PromptMessage>,
) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);

    tokio::spawn(async move {
        let mut reply = String::new();
        match client
            .chat_completion_stream(&messages, &model, CompletionOptions::chat())
            .await
        {
            Ok(mut tokens) => {
                while let Some(item) = tokens.next().await {
                    match item {
                        Ok(delta) => {
                            reply.push_str(&delta);
                            // Keep collecting after a disconnect so the reply is still stored.
                            let _ = tx.send(frame(json!({"content": delta}))).await;
                        }
                        Err(e) => {
                            warn!(
                                subsystem = "api",
                                component = "chat",
                                thread_id = %thread_id,
                                model = %model,
                                error = %e,
                                "Chat stream failed"
                            );
                            let _ = tx.send(frame(json!({"error": e.to_string()}))).await;
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "api",
                    component = "chat",
                    thread_id = %thread_id,
                    model = %model,
                    error = %e,
                    "Chat stream could not start"
                );
                let _ = tx.send(frame(json!({"error": e.to_string()}))).await;
            }
        }

        if !reply.is_empty() {
            if let Err(e) = state.db.chats.append(thread_id, role::ASSISTANT, &reply).await {
                warn!(
                    subsystem = "api",
                    component = "chat",
                    thread_id = %thread_id,
                    error = %e,
                    "Failed to store assistant reply"
                );
            }
        }
        let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
    });

    let sse = Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    );
    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response()
}

/// Complete a reply in one call and return the stored assistant message.
async fn complete_reply(
    state: &AppState,
    thread_id: Uuid,
    client: Arc<dyn StreamingCompletion>,
    model: &str,
    messages: &[PromptMessage],
) -> Result<Response, ApiError> {
    let reply = client
        .chat_completion(messages, model, CompletionOptions::chat())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let stored = state
        .db
        .chats
        .append(thread_id, role::ASSISTANT, &reply)
        .await?;
    Ok(Json(stored).into_response())
}

/// Retrieve context, assemble the prompt and answer with the thread history.
async fn respond(
    state: AppState,
    user: &User,
    thread_id: Uuid,
    query: &str,
    requested_model: Option<&str>,
    note_ids: Option<&[Uuid]>,
    stream: bool,
) -> Result<Response, ApiError> {
    let (client, own_key) = state.client_for(user);
    let model = resolve_model(ModelKind::Chat, own_key, requested_model);

    let context = note_context(&state, user.id, query, note_ids).await;
    let history = state.db.chats.messages(thread_id).await?;
    let messages = build_prompt(context.as_deref(), &history);

    info!(
        subsystem = "api",
        component = "chat",
        user_id = %user.id,
        thread_id = %thread_id,
        model = %model,
        result_count = history.len(),
        streaming = stream,
        "Chat completion requested"
    );

    if stream {
        Ok(stream_reply(state, thread_id, client, model, messages))
    } else {
        complete_reply(&state, thread_id, client, &model, &messages).await
    }
}

pub async fn list_threads(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let threads = state.db.chats.list_threads(auth.user.id).await?;
    Ok(Json(json!({"threads": threads})))
}

pub async fn create_thread(
    State(state): State<AppState>,
    auth: RequireAuth,
    body: Option<Json<CreateThreadRequest>>,
) -> Result<(StatusCode, Json<ChatThread>), ApiError> {
    let title = body
        .and_then(|Json(b)| b.title)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| THREAD_TITLE.to_string());
    let thread = state.db.chats.create_thread(auth.user.id, &title).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.db.chats.delete_thread(auth.user.id, thread_id).await?;
    Ok(Json(json!({"message": "Thread deleted"})))
}

pub async fn get_messages(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<ThreadWithMessages>, ApiError> {
    let thread = state.db.chats.fetch_thread(auth.user.id, thread_id).await?;
    let messages = state.db.chats.messages(thread.id).await?;
    Ok(Json(ThreadWithMessages { thread, messages }))
}

/// Post a user message and answer it.
///
/// # Returns
/// - SSE stream (default) or the stored assistant message when `stream` is false
/// - 400 Bad Request on empty content (no quota is charged)
/// - 404 Not Found when the thread is not the caller's
/// - 429 Too Many Requests when the chat quota is spent
pub async fn send_message(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    let user = auth.user;
    let thread = state.db.chats.fetch_thread(user.id, thread_id).await?;

    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest(CONTENT_REQUIRED.to_string()));
    }
    charge_quota(&state, &user, QuotaResource::Chat, 1).await?;

    state.db.chats.append(thread.id, role::USER, content).await?;
    if state.db.chats.messages(thread.id).await?.len() == 1 {
        state
            .db
            .chats
            .rename_thread(thread.id, &thread_title(content))
            .await?;
    }

    respond(
        state,
        &user,
        thread.id,
        content,
        req.model.as_deref(),
        req.note_ids.as_deref(),
        req.stream,
    )
    .await
}

/// Edit a user message; every later message is discarded.
pub async fn edit_message(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path((thread_id, message_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Value>, ApiError> {
    let thread = state.db.chats.fetch_thread(auth.user.id, thread_id).await?;
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest(CONTENT_REQUIRED.to_string()));
    }
    let msg = state
        .db
        .chats
        .edit_user_message(thread.id, message_id, content)
        .await?;
    Ok(Json(json!({"message": "Message updated", "msg": msg})))
}

/// Replace the last assistant reply with a freshly streamed one.
///
/// A thread with no user message is a 400 and leaves quota and history untouched.
pub async fn regenerate(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(thread_id): Path<Uuid>,
    body: Option<Json<RegenerateRequest>>,
) -> Result<Response, ApiError> {
    let user = auth.user;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let thread = state.db.chats.fetch_thread(user.id, thread_id).await?;
    let last = state
        .db
        .chats
        .last_user_message(thread.id)
        .await?
        .ok_or_else(|| ApiError::BadRequest(NOTHING_TO_REGENERATE.to_string()))?;

    charge_quota(&state, &user, QuotaResource::Chat, 1).await?;
    state.db.chats.delete_last_assistant(thread.id).await?;

    respond(
        state,
        &user,
        thread.id,
        &last.content,
        req.model.as_deref(),
        req.note_ids.as_deref(),
        true,
    )
    .await
}
