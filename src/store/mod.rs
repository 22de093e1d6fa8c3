// src/store/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        progress::{ProgressDelta, ProgressLedger},
        quiz::QuestionBank,
        sitting::Sitting,
    },
};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Storage contract for quiz-taking.
///
/// Each method is one transaction. Writes to a sitting are compare-and-set on
/// its `revision`, so a stale copy can never overwrite a newer one.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Loads an active quiz with its active questions and choices.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if the quiz does not exist or is inactive.
    async fn question_bank(&self, quiz_id: i64) -> Result<QuestionBank, AppError>;

    /// Whether the user is enrolled in the course and the quiz belongs to it.
    async fn may_take(&self, user_id: i64, quiz_id: i64, course_id: i64) -> Result<bool, AppError>;

    /// All sittings for the triple, complete or not, oldest first.
    async fn sittings_for(
        &self,
        user_id: i64,
        quiz_id: i64,
        course_id: i64,
    ) -> Result<Vec<Sitting>, AppError>;

    /// Persists a new sitting and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// `AppError::Conflict` if an incomplete sitting already exists for the triple.
    async fn insert_sitting(&self, sitting: &Sitting) -> Result<Sitting, AppError>;

    /// # Errors
    ///
    /// `AppError::NotFound` if no sitting has this id.
    async fn sitting(&self, sitting_id: i64) -> Result<Sitting, AppError>;

    /// Writes the sitting and, if given, applies the ledger delta for its user, atomically.
    ///
    /// # Errors
    ///
    /// `AppError::Conflict` if the stored revision differs from `sitting`'s.
    async fn save_sitting(
        &self,
        sitting: &Sitting,
        delta: Option<&ProgressDelta>,
    ) -> Result<Sitting, AppError>;

    /// Hard-deletes a sitting and its answers.
    async fn delete_sitting(&self, sitting_id: i64) -> Result<(), AppError>;

    /// The user's ledger; empty if they have never answered anything.
    async fn progress(&self, user_id: i64) -> Result<ProgressLedger, AppError>;

    /// Completed sittings, most recently ended first.
    async fn completed_sittings(&self, user_id: i64) -> Result<Vec<Sitting>, AppError>;
}
