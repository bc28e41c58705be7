//! Chat and quiz repository integration tests.

use errata_db::test_fixtures::TestDatabase;
use errata_db::{
    role, ChatRepository, NewQuizQuestion, QuizMode, QuizRepository, SessionRepository,
    UserRepository,
};

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_edit_user_message_truncates_later_history() {
    let t = TestDatabase::new().await;
    let user = t.create_user("chat").await;
    let thread = t.db.chats.create_thread(user.id, "New Chat").await.unwrap();

    let first = t.db.chats.append(thread.id, role::USER, "hi").await.unwrap();
    t.db.chats.append(thread.id, role::ASSISTANT, "hello").await.unwrap();
    t.db.chats.append(thread.id, role::USER, "more").await.unwrap();
    t.db.chats.append(thread.id, role::ASSISTANT, "sure").await.unwrap();

    let edited = t
        .db
        .chats
        .edit_user_message(thread.id, first.id, "hi there")
        .await
        .unwrap();
    assert_eq!(edited.content, "hi there");

    let messages = t.db.chats.messages(thread.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, first.id);

    t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_delete_last_assistant_and_last_user_lookup() {
    let t = TestDatabase::new().await;
    let user = t.create_user("regen").await;
    let thread = t.db.chats.create_thread(user.id, "New Chat").await.unwrap();

    t.db.chats.append(thread.id, role::USER, "q1").await.unwrap();
    t.db.chats.append(thread.id, role::ASSISTANT, "a1").await.unwrap();
    t.db.chats.append(thread.id, role::USER, "q2").await.unwrap();
    t.db.chats.append(thread.id, role::ASSISTANT, "a2").await.unwrap();

    assert!(t.db.chats.delete_last_assistant(thread.id).await.unwrap());
    let messages = t.db.chats.messages(thread.id).await.unwrap();
    assert_eq!(messages.last().unwrap().content, "q2");

    let last_user = t.db.chats.last_user_message(thread.id).await.unwrap().unwrap();
    assert_eq!(last_user.content, "q2");

    t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_threads_are_scoped_to_owner() {
    let t = TestDatabase::new().await;
    let alice = t.create_user("alice_chat").await;
    let bob = t.create_user("bob_chat").await;
    let thread = t.db.chats.create_thread(alice.id, "Mine").await.unwrap();

    assert!(t.db.chats.fetch_thread(bob.id, thread.id).await.is_err());
    assert!(t.db.chats.delete_thread(bob.id, thread.id).await.is_err());
    assert!(t.db.chats.list_threads(bob.id).await.unwrap().is_empty());

    t.remove_user(alice.id).await;
    t.remove_user(bob.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_quiz_answers_update_score() {
    let t = TestDatabase::new().await;
    let user = t.create_user("quiz").await;

    let session = t
        .db
        .quizzes
        .create_session(
            user.id,
            QuizMode::Generated,
            Some("{}".to_string()),
            vec![
                NewQuizQuestion {
                    note_id: None,
                    question_text: "2+2?".to_string(),
                    question_image_path: None,
                    reference_answer: Some("4".to_string()),
                },
                NewQuizQuestion {
                    note_id: None,
                    question_text: "3+3?".to_string(),
                    question_image_path: None,
                    reference_answer: Some("6".to_string()),
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(session.total, 2);
    assert_eq!(session.mode, "generated");

    let q0 = session.questions[0].id;
    let q1 = session.questions[1].id;
    let score = t.db.quizzes.record_answer(session.id, q0, "4", Some(true)).await.unwrap();
    assert_eq!((score.score, score.total), (1, 2));
    let score = t.db.quizzes.record_answer(session.id, q1, "7", None).await.unwrap();
    assert_eq!((score.score, score.total), (1, 2));

    let fetched = t.db.quizzes.fetch(user.id, session.id).await.unwrap();
    assert_eq!(fetched.questions[0].question_text, "2+2?");
    assert_eq!(fetched.questions[0].is_correct, Some(true));
    assert_eq!(fetched.questions[1].is_correct, None);
    assert_eq!(fetched.questions[1].user_answer.as_deref(), Some("7"));

    let listed = t.db.quizzes.list(user.id, 50).await.unwrap();
    assert_eq!(listed.len(), 1);

    t.remove_user(user.id).await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_sessions_resolve_until_revoked() {
    let t = TestDatabase::new().await;
    let user = t.create_user("session").await;
    let expires = chrono::Utc::now() + chrono::Duration::hours(1);

    t.db.sessions.create(user.id, "hash-live", expires).await.unwrap();
    let resolved = t.db.sessions.resolve("hash-live").await.unwrap().unwrap();
    assert_eq!(resolved.id, user.id);

    t.db.sessions.revoke("hash-live").await.unwrap();
    assert!(t.db.sessions.resolve("hash-live").await.unwrap().is_none());

    let past = chrono::Utc::now() - chrono::Duration::hours(1);
    t.db.sessions.create(user.id, "hash-expired", past).await.unwrap();
    assert!(t.db.sessions.resolve("hash-expired").await.unwrap().is_none());
    assert!(t.db.sessions.purge_expired().await.unwrap() >= 1);

    assert!(t.db.users.username_taken(&user.username).await.unwrap());
    t.db.users.set_api_key(user.id, Some("sealed")).await.unwrap();
    let reloaded = t.db.users.fetch(user.id).await.unwrap().unwrap();
    assert!(reloaded.has_own_api_key());

    t.remove_user(user.id).await;
}
