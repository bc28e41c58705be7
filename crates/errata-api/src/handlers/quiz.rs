//! Quiz handlers: start a session, grade answers, browse history.
//!
//! `original` quizzes replay stored mistakes; `generated` quizzes ask the
//! chat model for fresh questions on the same concepts. A session row is
//! written only once its questions exist.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use errata_core::defaults::{QUIZ_HISTORY_LIMIT, QUIZ_QUESTION_COUNT};
use errata_core::{
    ModelKind, NewQuizQuestion, Note, NoteRepository, PromptMessage, QuizFilters, QuizMode,
    QuizRepository, QuizSession, QuotaResource,
};
use errata_inference::prompts::{
    judge_options, judge_prompt, quiz_generation_options, quiz_generation_prompt, QuizSource,
};
use errata_inference::{parse_json_reply, resolve_model};

use crate::auth::RequireAuth;
use crate::middleware::charge_quota;
use crate::{ApiError, AppState};

/// Explanation returned when the model could not grade an answer.
pub const UNGRADED_EXPLANATION: &str = "Could not auto-grade. Please review.";

/// Question text used when a mistake has no transcribed question.
pub const REVIEW_PLACEHOLDER: &str = "Review this mistake";

#[derive(Debug, Deserialize)]
pub struct StartQuizRequest {
    #[serde(default)]
    pub mode: QuizMode,
    #[serde(default)]
    pub filters: QuizFilters,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    QUIZ_QUESTION_COUNT
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: Uuid,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuiz {
    #[serde(default)]
    questions: Vec<GeneratedQuestion>,
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    reference_answer: Option<String>,
    #[serde(default)]
    source_index: i64,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default)]
    is_correct: bool,
    #[serde(default)]
    explanation: String,
}

/// One question per mistake item of each sampled note.
pub fn original_questions(notes: &[Note]) -> Vec<NewQuizQuestion> {
    notes
        .iter()
        .flat_map(|note| {
            note.mistake_items.iter().map(move |mi| {
                let question_text = if mi.ocr_question.is_empty() {
                    REVIEW_PLACEHOLDER.to_string()
                } else {
                    mi.ocr_question.clone()
                };
                let reference_answer = mi
                    .ocr_answer
                    .clone()
                    .filter(|a| !a.is_empty())
                    .or_else(|| Some(mi.ocr_question.clone()));
                NewQuizQuestion {
                    note_id: Some(note.id),
                    question_text,
                    question_image_path: mi.crop_image_path.clone(),
                    reference_answer,
                }
            })
        })
        .collect()
}

/// The mistakes handed to the quiz generator.
pub fn quiz_sources(notes: &[Note]) -> Vec<QuizSource> {
    notes
        .iter()
        .flat_map(|note| {
            let subject = note.subject.clone().unwrap_or_else(|| "Unknown".to_string());
            note.mistake_items.iter().map(move |mi| QuizSource {
                question: mi.ocr_question.clone(),
                answer: mi.ocr_answer.clone(),
                subject: subject.clone(),
            })
        })
        .collect()
}

/// Attach generated questions to the sampled notes, clamping `source_index`.
fn attach_generated(generated: GeneratedQuiz, sample: &[Note]) -> Vec<NewQuizQuestion> {
    let last = sample.len().saturating_sub(1);
    generated
        .questions
        .into_iter()
        .map(|gq| {
            let idx = usize::try_from(gq.source_index.max(0))
                .unwrap_or(usize::MAX)
                .min(last);
            NewQuizQuestion {
                note_id: sample.get(idx).map(|n| n.id),
                question_text: gq.question,
                question_image_path: None,
                reference_answer: gq.reference_answer,
            }
        })
        .collect()
}

/// Start a quiz over a random sample of the notes matching `filters`.
///
/// # Returns
/// - 201 Created with the session and its questions
/// - 404 Not Found when no note matches
/// - 429 Too Many Requests when the quiz quota is spent
/// - 500 when question generation fails (nothing is stored)
pub async fn start_quiz(
    State(state): State<AppState>,
    auth: RequireAuth,
    Json(req): Json<StartQuizRequest>,
) -> Result<(StatusCode, Json<QuizSession>), ApiError> {
    let user = auth.user;
    let filter = req.filters.to_note_filter()?;
    charge_quota(&state, &user, QuotaResource::Quizzes, 1).await?;

    let mut notes = state.db.notes.list_matching(user.id, &filter).await?;
    if notes.is_empty() {
        return Err(ApiError::NotFound(
            "No notes match the selected filters".to_string(),
        ));
    }

    let take = req.count.max(1).min(notes.len());
    notes.shuffle(&mut rand::thread_rng());
    notes.truncate(take);
    let sample = notes;

    let questions = match req.mode {
        QuizMode::Original => original_questions(&sample),
        QuizMode::Generated => {
            let sources = quiz_sources(&sample);
            let count = req.count.min(sources.len());
            let (client, own_key) = state.client_for(&user);
            let model = resolve_model(ModelKind::Chat, own_key, None);
            let prompt = quiz_generation_prompt(count, &sources);

            let generated = client
                .chat_completion(&[PromptMessage::user(prompt)], &model, quiz_generation_options())
                .await
                .and_then(|reply| parse_json_reply::<GeneratedQuiz>(&reply));
            match generated {
                Ok(g) => attach_generated(g, &sample),
                Err(e) => {
                    error!(
                        subsystem = "api",
                        component = "quiz",
                        user_id = %user.id,
                        model = %model,
                        error = %e,
                        "Quiz generation failed"
                    );
                    return Err(ApiError::Internal(format!("Failed to generate quiz: {}", e)));
                }
            }
        }
    };

    let filters_json = serde_json::to_string(&req.filters).ok();
    let session = state
        .db
        .quizzes
        .create_session(user.id, req.mode, filters_json, questions)
        .await?;

    info!(
        subsystem = "api",
        component = "quiz",
        user_id = %user.id,
        session_id = %session.id,
        mode = req.mode.as_str(),
        result_count = session.total,
        "Quiz started"
    );
    Ok((StatusCode::CREATED, Json(session)))
}

/// Grade one answer with the chat model and update the score.
pub async fn submit_answer(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(session_id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = auth.user;
    let session = state.db.quizzes.fetch(user.id, session_id).await?;
    let question = state
        .db
        .quizzes
        .fetch_question(session.id, req.question_id)
        .await?;

    let (client, own_key) = state.client_for(&user);
    let model = resolve_model(ModelKind::Chat, own_key, None);
    let prompt = judge_prompt(
        &question.question_text,
        question.reference_answer.as_deref(),
        &req.answer,
    );
    let verdict = client
        .chat_completion(&[PromptMessage::user(prompt)], &model, judge_options())
        .await
        .and_then(|reply| parse_json_reply::<Verdict>(&reply));

    let (is_correct, explanation) = match verdict {
        Ok(v) => (Some(v.is_correct), v.explanation),
        Err(e) => {
            warn!(
                subsystem = "api",
                component = "quiz",
                session_id = %session.id,
                error = %e,
                "Auto-grading failed"
            );
            (None, UNGRADED_EXPLANATION.to_string())
        }
    };

    let score = state
        .db
        .quizzes
        .record_answer(session.id, question.id, &req.answer, is_correct)
        .await?;

    Ok(Json(json!({
        "is_correct": is_correct,
        "explanation": explanation,
        "score": score.score,
        "total": score.total,
    })))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    auth: RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let sessions = state
        .db
        .quizzes
        .list(auth.user.id, QUIZ_HISTORY_LIMIT)
        .await?;
    Ok(Json(json!({"sessions": sessions})))
}

pub async fn get_session(
    State(state): State<AppState>,
    auth: RequireAuth,
    Path(session_id): Path<Uuid>,
) -> Result<Json<QuizSession>, ApiError> {
    Ok(Json(state.db.quizzes.fetch(auth.user.id, session_id).await?))
}
