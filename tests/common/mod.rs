// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use lms_backend::{
    config::Config,
    models::quiz::{Choice, ChoiceOrder, Question, Quiz},
    routes,
    services::AttemptService,
    state::AppState,
    store::InMemoryStore,
    utils::jwt::sign_jwt,
};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        db_max_connections: 1,
    }
}

/// Spawns the app over `store` on a random port.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
pub async fn spawn_app(store: InMemoryStore) -> String {
    let state = AppState {
        attempts: AttemptService::new(Arc::new(store)),
        config: test_config(),
    };
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

pub fn token(user_id: i64, role: &str) -> String {
    sign_jwt(user_id, role, JWT_SECRET, 600).expect("Failed to sign token")
}

pub fn quiz(id: i64) -> Quiz {
    Quiz {
        id,
        title: format!("Quiz {}", id),
        pass_mark: 50,
        single_attempt: false,
        exam_paper: false,
        answers_at_end: false,
    }
}

/// Question `id` whose correct choice is `id * 10 + 1`; `id * 10 + 2` is wrong.
pub fn question(id: i64) -> Question {
    Question {
        id,
        content: format!("Question {}", id),
        explanation: Some(format!("Because {}", id)),
        choice_order: ChoiceOrder::Content,
        choices: vec![
            Choice { id: id * 10 + 2, text: "B wrong".into(), correct: false },
            Choice { id: id * 10 + 1, text: "A right".into(), correct: true },
        ],
    }
}

/// A store holding `quiz` with the given questions, linked to `course_id`, with `user_id` enrolled.
pub async fn seeded_store(quiz: Quiz, question_ids: &[i64], course_id: i64, user_id: i64) -> InMemoryStore {
    let store = InMemoryStore::new();
    let quiz_id = quiz.id;
    store
        .seed_quiz(quiz, question_ids.iter().map(|&id| question(id)).collect())
        .await;
    store.link_course(course_id, quiz_id).await;
    store.enroll(user_id, course_id).await;
    store
}
