// src/models/sitting.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::{progress::ProgressDelta, quiz::QuestionBank},
};

/// Persisted shape of a sitting.
///
/// Stores read and write this; all mutation goes through [`Sitting`] so the
/// queue and score rules cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SittingRecord {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    pub course_id: i64,
    /// Snapshot of the quiz's question ids taken at creation.
    pub question_order: Vec<i64>,
    /// Questions still to answer; the front is the current question.
    pub unattempted: Vec<i64>,
    /// One entry per wrong answer or grader mark, duplicates allowed.
    pub incorrect: Vec<i64>,
    pub current_score: i32,
    pub complete: bool,
    pub user_answers: BTreeMap<i64, i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful write.
    pub revision: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SittingState {
    Created,
    InProgress,
    Complete,
}

/// What a single submission did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub question_id: i64,
    pub correct: bool,
    pub delta: ProgressDelta,
}

/// One user's pass through a quiz within a course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sitting {
    record: SittingRecord,
}

impl Sitting {
    /// Starts a sitting over the bank's current question set.
    ///
    /// # Errors
    ///
    /// `AppError::Configuration` if the quiz has no active questions.
    pub fn create(
        user_id: i64,
        course_id: i64,
        bank: &QuestionBank,
        now: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        let question_order = bank.question_set()?;

        Ok(Self {
            record: SittingRecord {
                id: 0,
                user_id,
                quiz_id: bank.quiz().id,
                course_id,
                unattempted: question_order.clone(),
                question_order,
                incorrect: Vec::new(),
                current_score: 0,
                complete: false,
                user_answers: BTreeMap::new(),
                started_at: now,
                ended_at: None,
                revision: 0,
            },
        })
    }

    /// Rebuilds a sitting from storage.
    ///
    /// # Errors
    ///
    /// `AppError::InternalServerError` if the record breaks the queue invariants.
    pub fn from_record(record: SittingRecord) -> Result<Self, AppError> {
        if !record.question_order.ends_with(&record.unattempted) {
            return Err(AppError::InternalServerError(format!(
                "Sitting {} has an unattempted queue that is not a suffix of its question order",
                record.id
            )));
        }
        if record.complete && record.ended_at.is_none() {
            return Err(AppError::InternalServerError(format!(
                "Sitting {} is complete without an end time",
                record.id
            )));
        }
        Ok(Self { record })
    }

    pub fn record(&self) -> &SittingRecord {
        &self.record
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn user_id(&self) -> i64 {
        self.record.user_id
    }

    pub fn quiz_id(&self) -> i64 {
        self.record.quiz_id
    }

    pub fn current_score(&self) -> i32 {
        self.record.current_score
    }

    pub fn is_complete(&self) -> bool {
        self.record.complete
    }

    pub fn incorrect(&self) -> &[i64] {
        &self.record.incorrect
    }

    pub fn state(&self) -> SittingState {
        if self.record.complete {
            SittingState::Complete
        } else if self.record.user_answers.is_empty() {
            SittingState::Created
        } else {
            SittingState::InProgress
        }
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.record.id = id;
    }

    pub(crate) fn set_revision(&mut self, revision: i32) {
        self.record.revision = revision;
    }

    /// The question to answer next. Complete sittings have none.
    pub fn current_question(&self) -> Option<i64> {
        if self.record.complete {
            return None;
        }
        self.record.unattempted.first().copied()
    }

    /// Scores the answer to the current question and advances the queue.
    ///
    /// # Errors
    ///
    /// * `AppError::Protocol` if the sitting is complete or `question_id` is not the current question.
    /// * `AppError::NotFound` if `choice_id` is not a choice of the question. The sitting is untouched.
    pub fn submit_answer(
        &mut self,
        question_id: i64,
        choice_id: i64,
        bank: &QuestionBank,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, AppError> {
        if self.record.complete {
            return Err(AppError::Protocol(format!(
                "Sitting {} is already complete",
                self.record.id
            )));
        }
        match self.current_question() {
            Some(front) if front == question_id => {}
            Some(front) => {
                return Err(AppError::Protocol(format!(
                    "Expected an answer to question {}, got question {}",
                    front, question_id
                )));
            }
            None => {
                return Err(AppError::Protocol(format!(
                    "Sitting {} has no unattempted questions",
                    self.record.id
                )));
            }
        }

        let correct = bank.is_correct(question_id, choice_id)?;

        let delta = if correct {
            self.record.current_score += 1;
            ProgressDelta {
                category: bank.quiz().category(),
                score: 1,
                possible: 1,
            }
        } else {
            self.record_incorrect(question_id);
            ProgressDelta {
                category: bank.quiz().category(),
                score: 0,
                possible: 1,
            }
        };

        self.record.user_answers.insert(question_id, choice_id);
        self.record.unattempted.remove(0);

        if self.record.unattempted.is_empty() {
            self.finalize(now);
        }

        Ok(AnswerOutcome {
            question_id,
            correct,
            delta,
        })
    }

    fn record_incorrect(&mut self, question_id: i64) {
        self.record.incorrect.push(question_id);
        if self.record.complete {
            self.record.current_score -= 1;
        }
    }

    /// Marks a question wrong. Once the sitting is complete this also takes a point off.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if the question is not part of this sitting.
    pub fn add_incorrect(&mut self, question_id: i64) -> Result<(), AppError> {
        if !self.record.question_order.contains(&question_id) {
            return Err(AppError::NotFound(format!(
                "Question {} is not part of sitting {}",
                question_id, self.record.id
            )));
        }
        self.record_incorrect(question_id);
        Ok(())
    }

    /// Restores the credit for one wrong mark on `question_id`.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if the question is not marked incorrect. Score is unchanged.
    pub fn remove_incorrect(&mut self, question_id: i64) -> Result<(), AppError> {
        let pos = self
            .record
            .incorrect
            .iter()
            .position(|&q| q == question_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Question {} is not marked incorrect in sitting {}",
                    question_id, self.record.id
                ))
            })?;
        self.record.incorrect.remove(pos);
        self.record.current_score += 1;
        Ok(())
    }

    /// Moves the sitting to `Complete`. Safe to call any number of times.
    pub fn finalize(&mut self, now: DateTime<Utc>) {
        if !self.record.complete {
            self.record.complete = true;
            self.record.ended_at = Some(now);
        }
    }

    /// Score as a whole percentage of the question count, within 0..=100.
    pub fn percent_correct(&self) -> u8 {
        let total = self.record.question_order.len();
        if total == 0 {
            return 0;
        }

        let score = f64::from(self.record.current_score);
        let total = total as f64;
        if score > total {
            return 100;
        }

        let percent = (score / total * 100.0).round_ties_even();
        if percent < 1.0 { 0 } else { percent as u8 }
    }

    pub fn passed(&self, pass_mark: i16) -> bool {
        i16::from(self.percent_correct()) >= pass_mark
    }

    pub fn result_message(&self, pass_mark: i16) -> &'static str {
        if self.passed(pass_mark) {
            "You have passed this quiz, congratulation"
        } else {
            "You failed this quiz, give it one chance again."
        }
    }

    pub fn max_score(&self) -> usize {
        self.record.question_order.len()
    }

    /// `(answered, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (self.record.user_answers.len(), self.record.question_order.len())
    }

    /// Every question paired with the submitted choice, in question order.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` if any question has not been answered.
    pub fn questions_with_answers(&self) -> Result<Vec<(i64, i64)>, AppError> {
        self.record
            .question_order
            .iter()
            .map(|q| {
                self.record
                    .user_answers
                    .get(q)
                    .map(|&c| (*q, c))
                    .ok_or_else(|| {
                        AppError::NotFound(format!(
                            "Question {} has no answer in sitting {}",
                            q, self.record.id
                        ))
                    })
            })
            .collect()
    }

    /// The answered subset of the question order.
    pub fn answered_in_order(&self) -> Vec<(i64, i64)> {
        self.record
            .question_order
            .iter()
            .filter_map(|q| self.record.user_answers.get(q).map(|&c| (*q, c)))
            .collect()
    }
}
