// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        progress::{ProgressDelta, ProgressLedger},
        quiz::{QuestionBank, Question, Quiz},
        sitting::{Sitting, SittingRecord},
    },
    store::AttemptStore,
};

#[derive(Default)]
struct Inner {
    quizzes: HashMap<i64, (Quiz, Vec<Question>)>,
    course_quizzes: HashSet<(i64, i64)>,
    enrollments: HashSet<(i64, i64)>,
    sittings: BTreeMap<i64, SittingRecord>,
    ledgers: HashMap<i64, ProgressLedger>,
    next_sitting_id: i64,
}

/// In-memory store for tests and local runs.
///
/// Every call holds one lock for its whole duration, which gives the same
/// atomicity the Postgres store gets from transactions.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a quiz with its active questions, in quiz order.
    pub async fn seed_quiz(&self, quiz: Quiz, questions: Vec<Question>) {
        let mut inner = self.inner.lock().await;
        inner.quizzes.insert(quiz.id, (quiz, questions));
    }

    pub async fn link_course(&self, course_id: i64, quiz_id: i64) {
        self.inner.lock().await.course_quizzes.insert((course_id, quiz_id));
    }

    pub async fn enroll(&self, user_id: i64, course_id: i64) {
        self.inner.lock().await.enrollments.insert((user_id, course_id));
    }

    /// Number of stored sittings, complete or not.
    pub async fn sitting_count(&self) -> usize {
        self.inner.lock().await.sittings.len()
    }
}

fn hydrate(record: &SittingRecord) -> Result<Sitting, AppError> {
    Sitting::from_record(record.clone())
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn question_bank(&self, quiz_id: i64) -> Result<QuestionBank, AppError> {
        let inner = self.inner.lock().await;
        let (quiz, questions) = inner
            .quizzes
            .get(&quiz_id)
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))?;
        QuestionBank::new(quiz.clone(), questions.clone())
    }

    async fn may_take(&self, user_id: i64, quiz_id: i64, course_id: i64) -> Result<bool, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.enrollments.contains(&(user_id, course_id))
            && inner.course_quizzes.contains(&(course_id, quiz_id)))
    }

    async fn sittings_for(
        &self,
        user_id: i64,
        quiz_id: i64,
        course_id: i64,
    ) -> Result<Vec<Sitting>, AppError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<&SittingRecord> = inner
            .sittings
            .values()
            .filter(|r| r.user_id == user_id && r.quiz_id == quiz_id && r.course_id == course_id)
            .collect();
        records.sort_by_key(|r| (r.started_at, r.id));
        records.into_iter().map(hydrate).collect()
    }

    async fn insert_sitting(&self, sitting: &Sitting) -> Result<Sitting, AppError> {
        let mut inner = self.inner.lock().await;
        let new = sitting.record();

        let open_exists = inner.sittings.values().any(|r| {
            !r.complete
                && r.user_id == new.user_id
                && r.quiz_id == new.quiz_id
                && r.course_id == new.course_id
        });
        if open_exists && !new.complete {
            return Err(AppError::Conflict(format!(
                "User {} already has an open sitting for quiz {} in course {}",
                new.user_id, new.quiz_id, new.course_id
            )));
        }

        inner.next_sitting_id += 1;
        let id = inner.next_sitting_id;

        let mut stored = sitting.clone();
        stored.set_id(id);
        stored.set_revision(0);
        inner.sittings.insert(id, stored.record().clone());
        Ok(stored)
    }

    async fn sitting(&self, sitting_id: i64) -> Result<Sitting, AppError> {
        let inner = self.inner.lock().await;
        let record = inner
            .sittings
            .get(&sitting_id)
            .ok_or_else(|| AppError::NotFound(format!("Sitting {} not found", sitting_id)))?;
        hydrate(record)
    }

    async fn save_sitting(
        &self,
        sitting: &Sitting,
        delta: Option<&ProgressDelta>,
    ) -> Result<Sitting, AppError> {
        let mut inner = self.inner.lock().await;
        let incoming = sitting.record();

        let current = inner
            .sittings
            .get(&incoming.id)
            .ok_or_else(|| AppError::NotFound(format!("Sitting {} not found", incoming.id)))?;
        if current.revision != incoming.revision {
            return Err(AppError::Conflict(format!(
                "Sitting {} was modified concurrently",
                incoming.id
            )));
        }

        let mut saved = sitting.clone();
        saved.set_revision(incoming.revision + 1);
        inner.sittings.insert(incoming.id, saved.record().clone());

        if let Some(delta) = delta {
            inner
                .ledgers
                .entry(incoming.user_id)
                .or_insert_with(|| ProgressLedger::new(incoming.user_id))
                .update(delta);
        }

        Ok(saved)
    }

    async fn delete_sitting(&self, sitting_id: i64) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        inner
            .sittings
            .remove(&sitting_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Sitting {} not found", sitting_id)))
    }

    async fn progress(&self, user_id: i64) -> Result<ProgressLedger, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .ledgers
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| ProgressLedger::new(user_id)))
    }

    async fn completed_sittings(&self, user_id: i64) -> Result<Vec<Sitting>, AppError> {
        let inner = self.inner.lock().await;
        let mut records: Vec<&SittingRecord> = inner
            .sittings
            .values()
            .filter(|r| r.user_id == user_id && r.complete)
            .collect();
        records.sort_by(|a, b| b.ended_at.cmp(&a.ended_at).then(b.id.cmp(&a.id)));
        records.into_iter().map(hydrate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::fixtures::{question, quiz};
    use chrono::Utc;

    async fn seeded() -> (InMemoryStore, QuestionBank) {
        let store = InMemoryStore::new();
        store.seed_quiz(quiz(1), vec![question(1), question(2)]).await;
        let bank = store.question_bank(1).await.unwrap();
        (store, bank)
    }

    #[tokio::test]
    async fn second_open_sitting_conflicts() {
        let (store, bank) = seeded().await;
        let sitting = Sitting::create(7, 3, &bank, Utc::now()).unwrap();

        let first = store.insert_sitting(&sitting).await.unwrap();
        assert_eq!(first.id(), 1);

        let err = store.insert_sitting(&sitting).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.sitting_count().await, 1);
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let (store, bank) = seeded().await;
        let sitting = Sitting::create(7, 3, &bank, Utc::now()).unwrap();
        let stored = store.insert_sitting(&sitting).await.unwrap();

        let mut a = stored.clone();
        a.submit_answer(1, 11, &bank, Utc::now()).unwrap();
        let saved = store.save_sitting(&a, None).await.unwrap();
        assert_eq!(saved.record().revision, 1);

        let mut b = stored;
        b.submit_answer(1, 11, &bank, Utc::now()).unwrap();
        let err = store.save_sitting(&b, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn save_applies_ledger_delta() {
        let (store, bank) = seeded().await;
        let sitting = Sitting::create(7, 3, &bank, Utc::now()).unwrap();
        let mut stored = store.insert_sitting(&sitting).await.unwrap();

        let outcome = stored.submit_answer(1, 12, &bank, Utc::now()).unwrap();
        store.save_sitting(&stored, Some(&outcome.delta)).await.unwrap();

        let ledger = store.progress(7).await.unwrap();
        assert_eq!(ledger.get("1").map(|s| (s.score, s.possible)), Some((0, 1)));
        assert!(store.progress(8).await.unwrap().scores.is_empty());
    }
}
