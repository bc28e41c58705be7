//! Router tests against a real database.
//!
//! These drive whole requests through the router with a scripted completion
//! backend: uploads and the image quota, streamed chat replies, quiz starts
//! and admin quota edits. Run with `cargo test -- --ignored` and
//! `DATABASE_URL` pointing at a disposable database.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use errata_api::{router, AppConfig, AppState};
use errata_crypto::{generate_session_token, hash_token, ApiKeyCipher};
use errata_db::test_fixtures::TestDatabase;
use errata_db::{
    role, ChatRepository, CreateNoteRequest, MistakeItemInput, NewUser, NoteRepository,
    QuotaDefaults, QuotaRepository, SessionRepository, User, UserRepository,
};
use errata_inference::mock::MockCompletionBackend;

const BOUNDARY: &str = "errata-test-boundary";

struct Harness {
    t: TestDatabase,
    backend: MockCompletionBackend,
    uploads: tempfile::TempDir,
    app: Router,
}

impl Harness {
    async fn new(backend: MockCompletionBackend) -> Self {
        let t = TestDatabase::new().await;
        let uploads = tempfile::tempdir().unwrap();
        let config = AppConfig {
            upload_dir: uploads.path().to_path_buf(),
            rate_limit_enabled: false,
            ..Default::default()
        };
        let state = AppState::new(
            t.db.clone(),
            Arc::new(backend.clone()),
            ApiKeyCipher::generate(),
            config,
        );
        Self {
            t,
            backend,
            uploads,
            app: router(state),
        }
    }

    async fn login(&self, user: &User) -> String {
        let token = generate_session_token();
        self.t
            .db
            .sessions
            .create(user.id, &hash_token(&token), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        token
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn remaining_images(&self, user_id: Uuid) -> i32 {
        self.t.db.quotas.fetch(user_id).await.unwrap().unwrap().remaining_images
    }

    async fn remaining_chat(&self, user_id: Uuid) -> i32 {
        self.t.db.quotas.fetch(user_id).await.unwrap().unwrap().remaining_chat
    }

    fn stored_files(&self) -> usize {
        std::fs::read_dir(self.uploads.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .count()
    }
}

fn quota(chat: i32, images: i32, quizzes: i32) -> QuotaDefaults {
    QuotaDefaults {
        chat,
        images,
        quizzes,
        refresh_hours: 6,
    }
}

fn json_request(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut out = Vec::new();
    RgbImage::from_pixel(w, h, Rgb([250, 250, 250]))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn upload_request(token: &str, files: &[(&str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// The `data:` payloads of an SSE body, in order.
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|d| d.trim_start().to_string())
        .collect()
}

async fn note_with_mistake(t: &TestDatabase, user_id: Uuid, question: &str, answer: &str) -> Uuid {
    t.db
        .notes
        .create(
            user_id,
            CreateNoteRequest {
                title: Some(question.to_string()),
                content_md: question.to_string(),
                subject: Some("Math".to_string()),
                mistake_items: vec![MistakeItemInput {
                    ocr_question: question.to_string(),
                    ocr_answer: Some(answer.to_string()),
                    crop_image_path: Some("crops/crop_a.png".to_string()),
                    confidence: 0.9,
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

// =============================================================================
// UPLOAD
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_upload_over_quota_charges_and_stores_nothing() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let user = h.t.create_user_with_quota("upload_short", quota(5, 2, 5)).await;
    let token = h.login(&user).await;

    let page = png_bytes(20, 20);
    let response = h
        .send(upload_request(
            &token,
            &[("a.png", page.clone()), ("b.png", page.clone()), ("c.png", page)],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.remaining_images(user.id).await, 2);
    assert_eq!(h.stored_files(), 0);
    assert_eq!(h.backend.call_count("vision"), 0);

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_upload_charges_only_valid_images() {
    let backend = MockCompletionBackend::new().with_vision_reply(r#"{"mistakes": []}"#);
    let h = Harness::new(backend).await;
    let user = h.t.create_user_with_quota("upload_ok", quota(5, 3, 5)).await;
    let token = h.login(&user).await;

    let page = png_bytes(20, 20);
    let response = h
        .send(upload_request(
            &token,
            &[
                ("a.png", page.clone()),
                ("notes.txt", b"not an image".to_vec()),
                ("b.png", page),
            ],
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["mistakes"], json!([]));
    assert!(body["message"].is_string());
    assert_eq!(h.remaining_images(user.id).await, 1);
    assert_eq!(h.stored_files(), 2);
    assert_eq!(h.backend.call_count("vision"), 1);

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_upload_without_valid_images_is_free() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let user = h.t.create_user_with_quota("upload_bad", quota(5, 2, 5)).await;
    let token = h.login(&user).await;

    let response = h
        .send(upload_request(&token, &[("notes.txt", b"plain text".to_vec())]))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.remaining_images(user.id).await, 2);
    assert_eq!(h.stored_files(), 0);

    h.t.remove_user(user.id).await;
}

// =============================================================================
// CHAT
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_chat_streams_frames_then_stores_reply() {
    let backend = MockCompletionBackend::new().with_chat_reply("Rate of change");
    let h = Harness::new(backend).await;
    let user = h.t.create_user_with_quota("chat_sse", quota(5, 5, 5)).await;
    let token = h.login(&user).await;
    let thread = h.t.db.chats.create_thread(user.id, "New Chat").await.unwrap();

    let uri = format!("/api/chat/threads/{}/messages", thread.id);
    let response = h
        .send(json_request(
            Method::POST,
            &uri,
            &token,
            json!({"content": "  What is a derivative?  "}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");

    let frames = sse_data(&body_text(response).await);
    assert_eq!(
        frames,
        vec![
            r#"{"content":"Rate "}"#.to_string(),
            r#"{"content":"of "}"#.to_string(),
            r#"{"content":"change"}"#.to_string(),
            "[DONE]".to_string(),
        ]
    );

    let body = json_body(h.send(get(&uri, &token)).await).await;
    assert_eq!(body["title"], "What is a derivative?");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], role::USER);
    assert_eq!(messages[0]["content"], "What is a derivative?");
    assert_eq!(messages[1]["role"], role::ASSISTANT);
    assert_eq!(messages[1]["content"], "Rate of change");
    assert_eq!(h.remaining_chat(user.id).await, 4);

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_chat_retitles_only_on_first_message() {
    let backend = MockCompletionBackend::new()
        .with_chat_reply("first answer")
        .with_chat_reply("second answer");
    let h = Harness::new(backend).await;
    let user = h.t.create_user_with_quota("chat_title", quota(5, 5, 5)).await;
    let token = h.login(&user).await;
    let thread = h.t.db.chats.create_thread(user.id, "New Chat").await.unwrap();
    let uri = format!("/api/chat/threads/{}/messages", thread.id);

    let first = h
        .send(json_request(
            Method::POST,
            &uri,
            &token,
            json!({"content": "Explain the chain rule", "stream": false}),
        ))
        .await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["content"], "first answer");

    let second = h
        .send(json_request(
            Method::POST,
            &uri,
            &token,
            json!({"content": "And the product rule?", "stream": false}),
        ))
        .await;
    assert_eq!(second.status(), StatusCode::OK);

    let stored = h.t.db.chats.fetch_thread(user.id, thread.id).await.unwrap();
    assert_eq!(stored.title, "Explain the chain rule");
    assert_eq!(h.t.db.chats.messages(thread.id).await.unwrap().len(), 4);

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_regenerate_without_user_message_costs_nothing() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let user = h.t.create_user_with_quota("chat_regen", quota(3, 5, 5)).await;
    let token = h.login(&user).await;
    let thread = h.t.db.chats.create_thread(user.id, "New Chat").await.unwrap();
    h.t.db
        .chats
        .append(thread.id, role::ASSISTANT, "Hello, ask me anything.")
        .await
        .unwrap();

    let response = h
        .send(json_request(
            Method::POST,
            &format!("/api/chat/threads/{}/regenerate", thread.id),
            &token,
            json!({}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "No user message to regenerate from"
    );
    assert_eq!(h.remaining_chat(user.id).await, 3);
    let messages = h.t.db.chats.messages(thread.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, role::ASSISTANT);
    assert_eq!(h.backend.call_count("chat_stream"), 0);

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_regenerate_replaces_last_reply() {
    let backend = MockCompletionBackend::new().with_chat_reply("better answer");
    let h = Harness::new(backend).await;
    let user = h.t.create_user_with_quota("chat_regen_ok", quota(3, 5, 5)).await;
    let token = h.login(&user).await;
    let thread = h.t.db.chats.create_thread(user.id, "Limits").await.unwrap();
    h.t.db.chats.append(thread.id, role::USER, "lim x->0 sin x / x").await.unwrap();
    h.t.db.chats.append(thread.id, role::ASSISTANT, "weak answer").await.unwrap();

    let response = h
        .send(json_request(
            Method::POST,
            &format!("/api/chat/threads/{}/regenerate", thread.id),
            &token,
            json!({}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(sse_data(&body_text(response).await).last().unwrap(), "[DONE]");

    let messages = h.t.db.chats.messages(thread.id).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["lim x->0 sin x / x", "better answer"]);
    assert_eq!(h.remaining_chat(user.id).await, 2);

    h.t.remove_user(user.id).await;
}

// =============================================================================
// QUIZ
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_quiz_original_replays_mistakes() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let user = h.t.create_user_with_quota("quiz_orig", quota(5, 5, 2)).await;
    let token = h.login(&user).await;
    let note_id = note_with_mistake(&h.t, user.id, "Solve 2x = 8", "x = 4").await;

    let response = h
        .send(json_request(
            Method::POST,
            "/api/quiz/start",
            &token,
            json!({"mode": "original"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let session = json_body(response).await;
    assert_eq!(session["mode"], "original");
    assert_eq!(session["total"], 1);
    let question = &session["questions"][0];
    assert_eq!(question["note_id"], note_id.to_string());
    assert_eq!(question["question_text"], "Solve 2x = 8");
    assert_eq!(question["reference_answer"], "x = 4");
    assert_eq!(question["question_image_path"], "crops/crop_a.png");
    assert_eq!(h.backend.call_count("chat"), 0);
    assert_eq!(h.t.db.quotas.fetch(user.id).await.unwrap().unwrap().remaining_quizzes, 1);

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_quiz_generated_asks_model_for_questions() {
    let backend = MockCompletionBackend::new().with_chat_reply(
        r#"```json
{"questions": [{"question": "Solve 3x = 12", "reference_answer": "x = 4", "source_index": 5}]}
```"#,
    );
    let h = Harness::new(backend).await;
    let user = h.t.create_user_with_quota("quiz_gen", quota(5, 5, 2)).await;
    let token = h.login(&user).await;
    let note_id = note_with_mistake(&h.t, user.id, "Solve 2x = 8", "x = 4").await;

    let response = h
        .send(json_request(
            Method::POST,
            "/api/quiz/start",
            &token,
            json!({"mode": "generated", "count": 3}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let session = json_body(response).await;
    assert_eq!(session["mode"], "generated");
    assert_eq!(session["total"], 1);
    let question = &session["questions"][0];
    assert_eq!(question["question_text"], "Solve 3x = 12");
    assert_eq!(question["note_id"], note_id.to_string());
    assert!(question["question_image_path"].is_null());

    let calls = h.backend.get_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].input.contains("Solve 2x = 8"));

    h.t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_quiz_without_matching_notes_is_404() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let user = h.t.create_user_with_quota("quiz_empty", quota(5, 5, 2)).await;
    let token = h.login(&user).await;

    let response = h
        .send(json_request(Method::POST, "/api/quiz/start", &token, json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    h.t.remove_user(user.id).await;
}

// =============================================================================
// ADMIN
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_admin_updates_user_quota() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let suffix = Uuid::new_v4().simple().to_string();
    let admin = h
        .t
        .db
        .users
        .create(
            NewUser {
                username: format!("admin_{}", &suffix[..12]),
                email: format!("admin_{}@test.local", &suffix[..12]),
                password_hash: "$argon2id$test".to_string(),
                is_admin: true,
            },
            QuotaDefaults::default(),
        )
        .await
        .unwrap();
    let student = h.t.create_user_with_quota("quota_target", quota(5, 5, 5)).await;
    let token = h.login(&admin).await;

    let response = h
        .send(json_request(
            Method::PUT,
            &format!("/admin/users/{}/quota", student.id),
            &token,
            json!({"max_images": 40, "remaining_images": 12}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["quota"]["max_images"], 40);
    assert_eq!(body["quota"]["remaining_images"], 12);
    assert_eq!(body["quota"]["max_chat"], 5);

    let stored = h.t.db.quotas.fetch(student.id).await.unwrap().unwrap();
    assert_eq!((stored.max_images, stored.remaining_images), (40, 12));
    assert_eq!(stored.remaining_chat, 5);

    let missing = h
        .send(json_request(
            Method::PUT,
            &format!("/admin/users/{}/quota", Uuid::new_v4()),
            &token,
            json!({"max_images": 1}),
        ))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let listed = json_body(h.send(get("/admin/users", &token)).await).await;
    let row = listed["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["id"] == student.id.to_string())
        .cloned()
        .unwrap();
    assert_eq!(row["quota"]["remaining_images"], 12);

    h.t.remove_user(student.id).await;
    h.t.remove_user(admin.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_served_crop_has_image_headers() {
    let h = Harness::new(MockCompletionBackend::new()).await;
    let user = h.t.create_user("files").await;
    let token = h.login(&user).await;
    std::fs::create_dir_all(h.uploads.path().join("crops")).unwrap();
    std::fs::write(h.uploads.path().join("crops/crop_x.png"), png_bytes(4, 4)).unwrap();

    let response = h.send(get("/uploads/crops/crop_x.png", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "image/png");
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "private, max-age=3600"
    );

    h.t.remove_user(user.id).await;
}
