// src/services/attempts.rs

use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        attempt::{
            AnsweredQuestion, PreviousOutcome, ProgressCount, PublicQuestion, ResultView,
            SittingScore, SittingSummary, StartAttemptResponse, SubmitAnswerResponse,
        },
        progress::ProgressLedger,
        quiz::QuestionBank,
        sitting::Sitting,
    },
    store::AttemptStore,
};

/// Quiz-taking operations on top of an [`AttemptStore`].
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn AttemptStore>,
}

fn public_question(bank: &QuestionBank, question_id: Option<i64>) -> Result<Option<PublicQuestion>, AppError> {
    question_id
        .map(|id| bank.question(id).map(PublicQuestion::from))
        .transpose()
}

/// Finalizes a sitting whose current question is no longer in the quiz.
///
/// Returns the id of the missing question when the sitting was closed.
fn close_if_stale(sitting: &mut Sitting, bank: &QuestionBank) -> Option<i64> {
    let front = sitting.current_question()?;
    if bank.question(front).is_ok() {
        return None;
    }
    sitting.finalize(Utc::now());
    Some(front)
}

impl AttemptService {
    pub fn new(store: Arc<dyn AttemptStore>) -> Self {
        Self { store }
    }

    /// Resumes the user's open sitting for this quiz and course, or starts one.
    ///
    /// * `Forbidden` if the user may not take the quiz under this course.
    /// * `AlreadyAttempted` if the quiz allows one attempt and it has been completed.
    /// * `Configuration` if the quiz has no active questions.
    pub async fn start_or_resume(
        &self,
        user_id: i64,
        quiz_id: i64,
        course_id: i64,
    ) -> Result<StartAttemptResponse, AppError> {
        if !self.store.may_take(user_id, quiz_id, course_id).await? {
            return Err(AppError::Forbidden(format!(
                "User {} may not take quiz {} in course {}",
                user_id, quiz_id, course_id
            )));
        }

        let bank = self.store.question_bank(quiz_id).await?;

        let sitting = match self.resolve(user_id, course_id, &bank).await {
            Err(AppError::Conflict(msg)) => {
                tracing::warn!(user_id, quiz_id, course_id, "Sitting creation raced, retrying: {}", msg);
                self.resolve(user_id, course_id, &bank).await?
            }
            other => other?,
        };

        Ok(StartAttemptResponse {
            sitting_id: sitting.id(),
            state: sitting.state(),
            current_question: public_question(&bank, sitting.current_question())?,
            progress: ProgressCount::from(&sitting),
        })
    }

    async fn resolve(&self, user_id: i64, course_id: i64, bank: &QuestionBank) -> Result<Sitting, AppError> {
        let quiz = bank.quiz();
        let sittings = self.store.sittings_for(user_id, quiz.id, course_id).await?;

        if quiz.single_attempt && sittings.iter().any(Sitting::is_complete) {
            return Err(AppError::AlreadyAttempted(
                "You have already sat this exam and only one sitting is permitted".to_string(),
            ));
        }

        let mut open: Vec<Sitting> = sittings.into_iter().filter(|s| !s.is_complete()).collect();
        if open.len() > 1 {
            tracing::warn!(
                user_id,
                quiz_id = quiz.id,
                course_id,
                count = open.len(),
                "Multiple open sittings found, resuming the oldest"
            );
        }
        if !open.is_empty() {
            let mut sitting = open.swap_remove(0);
            if let Some(missing) = close_if_stale(&mut sitting, bank) {
                tracing::warn!(
                    sitting_id = sitting.id(),
                    question_id = missing,
                    "Pending question left the quiz, closing sitting"
                );
                return self.store.save_sitting(&sitting, None).await;
            }
            return Ok(sitting);
        }

        let sitting = Sitting::create(user_id, course_id, bank, Utc::now())?;
        let sitting = self.store.insert_sitting(&sitting).await?;
        tracing::info!(sitting_id = sitting.id(), user_id, quiz_id = quiz.id, course_id, "Sitting created");
        Ok(sitting)
    }

    async fn owned_sitting(&self, user_id: i64, sitting_id: i64) -> Result<Sitting, AppError> {
        let sitting = self.store.sitting(sitting_id).await?;
        if sitting.user_id() != user_id {
            return Err(AppError::NotFound(format!("Sitting {} not found", sitting_id)));
        }
        Ok(sitting)
    }

    /// Scores one answer and records its ledger delta in the same write.
    pub async fn submit_answer(
        &self,
        user_id: i64,
        sitting_id: i64,
        question_id: i64,
        choice_id: i64,
    ) -> Result<SubmitAnswerResponse, AppError> {
        let mut sitting = self.owned_sitting(user_id, sitting_id).await?;
        let bank = self.store.question_bank(sitting.quiz_id()).await?;

        if let Some(missing) = close_if_stale(&mut sitting, &bank) {
            self.store.save_sitting(&sitting, None).await?;
            tracing::warn!(sitting_id, question_id = missing, "Pending question left the quiz, closing sitting");
            return Err(AppError::Protocol(format!(
                "Question {} is no longer part of the quiz, sitting {} has been closed",
                missing, sitting_id
            )));
        }

        let outcome = sitting.submit_answer(question_id, choice_id, &bank, Utc::now())?;
        if let Some(missing) = close_if_stale(&mut sitting, &bank) {
            tracing::warn!(sitting_id, question_id = missing, "Next question left the quiz, closing sitting");
        }
        let sitting = self.store.save_sitting(&sitting, Some(&outcome.delta)).await?;

        if sitting.is_complete() {
            tracing::info!(sitting_id, user_id, score = sitting.current_score(), "Sitting complete");
        }

        let question = bank.question(question_id)?;
        let reveal = !bank.quiz().answers_at_end;

        Ok(SubmitAnswerResponse {
            next_question: public_question(&bank, sitting.current_question())?,
            previous_outcome: PreviousOutcome {
                question_id,
                correct: outcome.correct,
                correct_choice_id: question.correct_choice().filter(|_| reveal),
                explanation: question.explanation.clone().filter(|_| reveal),
            },
            is_complete: sitting.is_complete(),
            progress: ProgressCount::from(&sitting),
        })
    }

    /// Finalizes the sitting and returns its result.
    ///
    /// Sittings of quizzes that are not exam papers are deleted once the result is built.
    pub async fn get_result(&self, user_id: i64, sitting_id: i64) -> Result<ResultView, AppError> {
        let mut sitting = self.owned_sitting(user_id, sitting_id).await?;
        let bank = self.store.question_bank(sitting.quiz_id()).await?;
        let quiz = bank.quiz();

        if !sitting.is_complete() {
            sitting.finalize(Utc::now());
            sitting = self.store.save_sitting(&sitting, None).await?;
            tracing::info!(sitting_id, user_id, "Sitting finished early");
        }

        let (questions_with_answers, incorrect_questions) = if quiz.answers_at_end {
            let pairs = if sitting.record().unattempted.is_empty() {
                sitting.questions_with_answers()?
            } else {
                sitting.answered_in_order()
            };
            let answered = pairs
                .into_iter()
                .filter_map(|(question_id, choice_id)| {
                    bank.question(question_id).ok().map(|q| AnsweredQuestion {
                        question_id,
                        content: q.content.clone(),
                        choice_id,
                        correct_choice_id: q.correct_choice(),
                    })
                })
                .collect();
            (Some(answered), Some(sitting.incorrect().to_vec()))
        } else {
            (None, None)
        };

        let view = ResultView {
            sitting_id,
            score: sitting.current_score(),
            max_score: sitting.max_score(),
            percent: sitting.percent_correct(),
            passed: sitting.passed(quiz.pass_mark),
            message: sitting.result_message(quiz.pass_mark).to_string(),
            questions_with_answers,
            incorrect_questions,
        };

        if !quiz.retains_sittings() {
            match self.store.delete_sitting(sitting_id).await {
                Ok(()) => tracing::info!(sitting_id, user_id, "Sitting discarded after result"),
                // A concurrent result request got there first.
                Err(AppError::NotFound(_)) => {
                    tracing::debug!(sitting_id, user_id, "Sitting already discarded")
                }
                Err(e) => return Err(e),
            }
        }

        Ok(view)
    }

    /// Grader correction: marks a question wrong, deducting a point on completed sittings.
    pub async fn mark_incorrect(&self, sitting_id: i64, question_id: i64) -> Result<SittingScore, AppError> {
        let mut sitting = self.store.sitting(sitting_id).await?;
        sitting.add_incorrect(question_id)?;
        let sitting = self.store.save_sitting(&sitting, None).await?;
        tracing::info!(sitting_id, question_id, score = sitting.current_score(), "Question marked incorrect");
        Ok(SittingScore::from(&sitting))
    }

    /// Grader correction: restores credit for a question marked wrong.
    pub async fn restore_credit(&self, sitting_id: i64, question_id: i64) -> Result<SittingScore, AppError> {
        let mut sitting = self.store.sitting(sitting_id).await?;
        sitting.remove_incorrect(question_id)?;
        let sitting = self.store.save_sitting(&sitting, None).await?;
        tracing::info!(sitting_id, question_id, score = sitting.current_score(), "Credit restored");
        Ok(SittingScore::from(&sitting))
    }

    pub async fn progress(&self, user_id: i64) -> Result<ProgressLedger, AppError> {
        self.store.progress(user_id).await
    }

    /// The user's completed sittings, newest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<SittingSummary>, AppError> {
        let sittings = self.store.completed_sittings(user_id).await?;
        Ok(sittings.iter().map(SittingSummary::from).collect())
    }
}
