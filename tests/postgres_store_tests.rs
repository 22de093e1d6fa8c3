// tests/postgres_store_tests.rs
//
// These run against a real Postgres when DATABASE_URL is set, and are skipped otherwise.

use std::sync::Arc;

use chrono::Utc;
use lms_backend::{
    error::AppError,
    models::sitting::Sitting,
    services::AttemptService,
    store::{AttemptStore, PgStore},
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

async fn connect() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres tests");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

struct Seeded {
    user_id: i64,
    course_id: i64,
    quiz_id: i64,
    /// (question id, correct choice id, wrong choice id)
    questions: Vec<(i64, i64, i64)>,
}

/// Seeds a two-question quiz linked to a fresh course with a fresh enrolled user.
async fn seed(pool: &PgPool, exam_paper: bool) -> Seeded {
    let user_id = 1_000_000 + i64::from(rand::random::<u32>());
    let course_id = 1_000_000 + i64::from(rand::random::<u32>());

    let quiz_id: i64 = sqlx::query_scalar(
        "INSERT INTO quizzes (title, pass_mark, exam_paper) VALUES ('Roofs', 50, $1) RETURNING id",
    )
    .bind(exam_paper)
    .fetch_one(pool)
    .await
    .unwrap();

    let mut questions = Vec::new();
    for position in 0..2 {
        let question_id: i64 = sqlx::query_scalar(
            "INSERT INTO questions (content, choice_order) VALUES ($1, 'content') RETURNING id",
        )
        .bind(format!("Question {}", position))
        .fetch_one(pool)
        .await
        .unwrap();

        let right: i64 = sqlx::query_scalar(
            "INSERT INTO choices (question_id, text, correct) VALUES ($1, 'A', TRUE) RETURNING id",
        )
        .bind(question_id)
        .fetch_one(pool)
        .await
        .unwrap();
        let wrong: i64 = sqlx::query_scalar(
            "INSERT INTO choices (question_id, text, correct) VALUES ($1, 'B', FALSE) RETURNING id",
        )
        .bind(question_id)
        .fetch_one(pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO quiz_questions (quiz_id, question_id, position) VALUES ($1, $2, $3)")
            .bind(quiz_id)
            .bind(question_id)
            .bind(position)
            .execute(pool)
            .await
            .unwrap();

        questions.push((question_id, right, wrong));
    }

    sqlx::query("INSERT INTO course_quizzes (course_id, quiz_id) VALUES ($1, $2)")
        .bind(course_id)
        .bind(quiz_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO course_enrollments (user_id, course_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(course_id)
        .execute(pool)
        .await
        .unwrap();

    Seeded {
        user_id,
        course_id,
        quiz_id,
        questions,
    }
}

#[tokio::test]
async fn open_sitting_is_unique_per_triple() {
    let Some(pool) = connect().await else { return };
    let seeded = seed(&pool, false).await;
    let store = PgStore::new(pool);

    let bank = store.question_bank(seeded.quiz_id).await.unwrap();
    let sitting = Sitting::create(seeded.user_id, seeded.course_id, &bank, Utc::now()).unwrap();

    store.insert_sitting(&sitting).await.unwrap();
    let err = store.insert_sitting(&sitting).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn answers_and_ledger_are_written_together() {
    let Some(pool) = connect().await else { return };
    let seeded = seed(&pool, true).await;
    let store = PgStore::new(pool);
    let service = AttemptService::new(Arc::new(store.clone()));

    let started = service
        .start_or_resume(seeded.user_id, seeded.quiz_id, seeded.course_id)
        .await
        .unwrap();
    let (q1, right1, _) = seeded.questions[0];
    let (q2, _, wrong2) = seeded.questions[1];
    assert_eq!(started.current_question.map(|q| q.id), Some(q1));

    service
        .submit_answer(seeded.user_id, started.sitting_id, q1, right1)
        .await
        .unwrap();
    let last = service
        .submit_answer(seeded.user_id, started.sitting_id, q2, wrong2)
        .await
        .unwrap();
    assert!(last.is_complete);

    let stored = store.sitting(started.sitting_id).await.unwrap();
    assert_eq!(stored.current_score(), 1);
    assert_eq!(stored.incorrect(), &[q2]);
    assert_eq!(stored.questions_with_answers().unwrap(), vec![(q1, right1), (q2, wrong2)]);
    assert_eq!(stored.record().revision, 2);

    let ledger = store.progress(seeded.user_id).await.unwrap();
    let category = seeded.quiz_id.to_string();
    assert_eq!(ledger.get(&category).map(|s| (s.score, s.possible)), Some((1, 2)));

    let result = service
        .get_result(seeded.user_id, started.sitting_id)
        .await
        .unwrap();
    assert_eq!(result.percent, 50);
    assert!(store.sitting(started.sitting_id).await.is_ok(), "exam papers are retained");
}

#[tokio::test]
async fn stale_write_rolls_back_ledger() {
    let Some(pool) = connect().await else { return };
    let seeded = seed(&pool, false).await;
    let store = PgStore::new(pool);

    let bank = store.question_bank(seeded.quiz_id).await.unwrap();
    let sitting = Sitting::create(seeded.user_id, seeded.course_id, &bank, Utc::now()).unwrap();
    let stored = store.insert_sitting(&sitting).await.unwrap();
    let (q1, right1, _) = seeded.questions[0];

    let mut a = stored.clone();
    let outcome = a.submit_answer(q1, right1, &bank, Utc::now()).unwrap();
    store.save_sitting(&a, Some(&outcome.delta)).await.unwrap();

    let mut b = stored;
    let outcome = b.submit_answer(q1, right1, &bank, Utc::now()).unwrap();
    let err = store.save_sitting(&b, Some(&outcome.delta)).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let ledger = store.progress(seeded.user_id).await.unwrap();
    let category = seeded.quiz_id.to_string();
    assert_eq!(ledger.get(&category).map(|s| (s.score, s.possible)), Some((1, 1)));
}

#[tokio::test]
async fn practice_sitting_is_deleted_with_its_answers() {
    let Some(pool) = connect().await else { return };
    let seeded = seed(&pool, false).await;
    let store = PgStore::new(pool.clone());
    let service = AttemptService::new(Arc::new(store.clone()));

    let started = service
        .start_or_resume(seeded.user_id, seeded.quiz_id, seeded.course_id)
        .await
        .unwrap();
    let (q1, right1, _) = seeded.questions[0];
    service
        .submit_answer(seeded.user_id, started.sitting_id, q1, right1)
        .await
        .unwrap();

    service
        .get_result(seeded.user_id, started.sitting_id)
        .await
        .unwrap();

    let err = store.sitting(started.sitting_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let leftover: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sitting_answers WHERE sitting_id = $1")
        .bind(started.sitting_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(leftover, 0);
}
