// src/store/postgres.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::{
    error::AppError,
    models::{
        progress::{CategoryScore, ProgressDelta, ProgressLedger},
        quiz::{Choice, ChoiceOrder, Question, QuestionBank, Quiz},
        sitting::{Sitting, SittingRecord},
    },
    store::AttemptStore,
};

const SITTING_COLUMNS: &str = "id, user_id, quiz_id, course_id, question_order, unattempted, \
     incorrect, current_score, complete, started_at, ended_at, revision";

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    content: String,
    explanation: Option<String>,
    choice_order: Option<String>,
}

#[derive(FromRow)]
struct ChoiceRow {
    question_id: i64,
    id: i64,
    text: String,
    correct: bool,
}

/// Represents the 'sittings' table in the database.
#[derive(FromRow)]
struct SittingRow {
    id: i64,
    user_id: i64,
    quiz_id: i64,
    course_id: i64,
    question_order: Vec<i64>,
    unattempted: Vec<i64>,
    incorrect: Vec<i64>,
    current_score: i32,
    complete: bool,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    revision: i32,
}

/// Represents the 'sitting_answers' table in the database.
#[derive(FromRow)]
struct AnswerRow {
    sitting_id: i64,
    question_id: i64,
    choice_id: i64,
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches answers to sitting rows, keeping the row order.
    async fn hydrate(&self, rows: Vec<SittingRow>) -> Result<Vec<Sitting>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let answers: Vec<AnswerRow> = sqlx::query_as(
            "SELECT sitting_id, question_id, choice_id FROM sitting_answers WHERE sitting_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch sitting answers: {:?}", e);
            AppError::from(e)
        })?;

        let mut by_sitting: HashMap<i64, BTreeMap<i64, i64>> = HashMap::new();
        for a in answers {
            by_sitting
                .entry(a.sitting_id)
                .or_default()
                .insert(a.question_id, a.choice_id);
        }

        rows.into_iter()
            .map(|row| {
                let user_answers = by_sitting.remove(&row.id).unwrap_or_default();
                Sitting::from_record(SittingRecord {
                    id: row.id,
                    user_id: row.user_id,
                    quiz_id: row.quiz_id,
                    course_id: row.course_id,
                    question_order: row.question_order,
                    unattempted: row.unattempted,
                    incorrect: row.incorrect,
                    current_score: row.current_score,
                    complete: row.complete,
                    user_answers,
                    started_at: row.started_at,
                    ended_at: row.ended_at,
                    revision: row.revision,
                })
            })
            .collect()
    }
}

async fn upsert_progress(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    delta: &ProgressDelta,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO progress_scores (user_id, category, score, possible)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, category) DO UPDATE SET
            score = progress_scores.score + EXCLUDED.score,
            possible = progress_scores.possible + EXCLUDED.possible
        "#,
    )
    .bind(user_id)
    .bind(&delta.category)
    .bind(i64::from(delta.score))
    .bind(i64::from(delta.possible))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn question_bank(&self, quiz_id: i64) -> Result<QuestionBank, AppError> {
        let quiz: Quiz = sqlx::query_as(
            r#"
            SELECT id, title, pass_mark, single_attempt, exam_paper, answers_at_end
            FROM quizzes
            WHERE id = $1 AND active AND deleted_at IS NULL
            "#,
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))?;

        let question_rows: Vec<QuestionRow> = sqlx::query_as(
            r#"
            SELECT q.id, q.content, q.explanation, q.choice_order
            FROM questions q
            JOIN quiz_questions qq ON qq.question_id = q.id
            WHERE qq.quiz_id = $1 AND q.active AND q.deleted_at IS NULL
            ORDER BY qq.position, q.id
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        let question_ids: Vec<i64> = question_rows.iter().map(|q| q.id).collect();
        let choice_rows: Vec<ChoiceRow> = sqlx::query_as(
            r#"
            SELECT question_id, id, text, correct
            FROM choices
            WHERE question_id = ANY($1) AND active AND deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .bind(&question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut choices: HashMap<i64, Vec<Choice>> = HashMap::new();
        for c in choice_rows {
            choices.entry(c.question_id).or_default().push(Choice {
                id: c.id,
                text: c.text,
                correct: c.correct,
            });
        }

        let questions = question_rows
            .into_iter()
            .map(|q| Question {
                choices: choices.remove(&q.id).unwrap_or_default(),
                choice_order: ChoiceOrder::from_column(q.choice_order.as_deref()),
                id: q.id,
                content: q.content,
                explanation: q.explanation,
            })
            .collect();

        QuestionBank::new(quiz, questions)
    }

    async fn may_take(&self, user_id: i64, quiz_id: i64, course_id: i64) -> Result<bool, AppError> {
        let allowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM course_enrollments e
                JOIN course_quizzes cq ON cq.course_id = e.course_id
                WHERE e.user_id = $1 AND e.course_id = $2 AND cq.quiz_id = $3
                  AND e.deleted_at IS NULL
            )
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }

    async fn sittings_for(
        &self,
        user_id: i64,
        quiz_id: i64,
        course_id: i64,
    ) -> Result<Vec<Sitting>, AppError> {
        let rows: Vec<SittingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sittings
             WHERE user_id = $1 AND quiz_id = $2 AND course_id = $3
             ORDER BY started_at, id",
            SITTING_COLUMNS
        ))
        .bind(user_id)
        .bind(quiz_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn insert_sitting(&self, sitting: &Sitting) -> Result<Sitting, AppError> {
        let r = sitting.record();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sittings (
                user_id, quiz_id, course_id, question_order, unattempted, incorrect,
                current_score, complete, started_at, ended_at, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0)
            RETURNING id
            "#,
        )
        .bind(r.user_id)
        .bind(r.quiz_id)
        .bind(r.course_id)
        .bind(&r.question_order)
        .bind(&r.unattempted)
        .bind(&r.incorrect)
        .bind(r.current_score)
        .bind(r.complete)
        .bind(r.started_at)
        .bind(r.ended_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = AppError::from(e);
            if !matches!(err, AppError::Conflict(_)) {
                tracing::error!("Failed to insert sitting: {}", err);
            }
            err
        })?;

        let mut stored = sitting.clone();
        stored.set_id(id);
        stored.set_revision(0);
        Ok(stored)
    }

    async fn sitting(&self, sitting_id: i64) -> Result<Sitting, AppError> {
        let row: SittingRow = sqlx::query_as(&format!(
            "SELECT {} FROM sittings WHERE id = $1",
            SITTING_COLUMNS
        ))
        .bind(sitting_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sitting {} not found", sitting_id)))?;

        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("Sitting {} not found", sitting_id)))
    }

    async fn save_sitting(
        &self,
        sitting: &Sitting,
        delta: Option<&ProgressDelta>,
    ) -> Result<Sitting, AppError> {
        let r = sitting.record();
        let mut tx = self.pool.begin().await?;

        let revision: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE sittings SET
                unattempted = $2,
                incorrect = $3,
                current_score = $4,
                complete = $5,
                ended_at = $6,
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1 AND revision = $7
            RETURNING revision
            "#,
        )
        .bind(r.id)
        .bind(&r.unattempted)
        .bind(&r.incorrect)
        .bind(r.current_score)
        .bind(r.complete)
        .bind(r.ended_at)
        .bind(r.revision)
        .fetch_optional(&mut *tx)
        .await?;

        // Dropping `tx` without commit rolls back.
        let Some(revision) = revision else {
            return Err(AppError::Conflict(format!(
                "Sitting {} was modified concurrently or no longer exists",
                r.id
            )));
        };

        if !r.user_answers.is_empty() {
            let (questions, choices): (Vec<i64>, Vec<i64>) =
                r.user_answers.iter().map(|(q, c)| (*q, *c)).unzip();
            sqlx::query(
                r#"
                INSERT INTO sitting_answers (sitting_id, question_id, choice_id)
                SELECT $1, q, c FROM UNNEST($2::BIGINT[], $3::BIGINT[]) AS a(q, c)
                ON CONFLICT (sitting_id, question_id) DO UPDATE SET choice_id = EXCLUDED.choice_id
                "#,
            )
            .bind(r.id)
            .bind(&questions)
            .bind(&choices)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(delta) = delta {
            upsert_progress(&mut tx, r.user_id, delta).await?;
        }

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit sitting {}: {:?}", r.id, e);
            AppError::from(e)
        })?;

        let mut saved = sitting.clone();
        saved.set_revision(revision);
        Ok(saved)
    }

    async fn delete_sitting(&self, sitting_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM sittings WHERE id = $1")
            .bind(sitting_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Sitting {} not found", sitting_id)));
        }
        Ok(())
    }

    async fn progress(&self, user_id: i64) -> Result<ProgressLedger, AppError> {
        let scores: Vec<CategoryScore> = sqlx::query_as(
            "SELECT category, score, possible FROM progress_scores WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ProgressLedger { user_id, scores })
    }

    async fn completed_sittings(&self, user_id: i64) -> Result<Vec<Sitting>, AppError> {
        let rows: Vec<SittingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sittings
             WHERE user_id = $1 AND complete
             ORDER BY ended_at DESC, id DESC",
            SITTING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }
}
