// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    quiz::Question,
    sitting::{Sitting, SittingState},
};

/// A choice as shown to the user (no correctness flag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicChoice {
    pub id: i64,
    pub text: String,
}

/// DTO for sending a question to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub content: String,
    pub choices: Vec<PublicChoice>,
}

impl From<&Question> for PublicQuestion {
    fn from(question: &Question) -> Self {
        Self {
            id: question.id,
            content: question.content.clone(),
            choices: question
                .ordered_choices()
                .into_iter()
                .map(|c| PublicChoice {
                    id: c.id,
                    text: c.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressCount {
    pub answered: usize,
    pub total: usize,
}

impl From<&Sitting> for ProgressCount {
    fn from(sitting: &Sitting) -> Self {
        let (answered, total) = sitting.progress();
        Self { answered, total }
    }
}

/// Returned when a sitting is started or resumed.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub sitting_id: i64,
    pub state: SittingState,
    pub current_question: Option<PublicQuestion>,
    pub progress: ProgressCount,
}

/// DTO for submitting one answer.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(range(min = 1, message = "question_id must be positive"))]
    pub question_id: i64,
    #[validate(range(min = 1, message = "choice_id must be positive"))]
    pub choice_id: i64,
}

/// Feedback on the answer just submitted.
///
/// `correct_choice_id` and `explanation` stay empty when the quiz defers answers to the end.
#[derive(Debug, Serialize, Deserialize)]
pub struct PreviousOutcome {
    pub question_id: i64,
    pub correct: bool,
    pub correct_choice_id: Option<i64>,
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub next_question: Option<PublicQuestion>,
    pub previous_outcome: PreviousOutcome,
    pub is_complete: bool,
    pub progress: ProgressCount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnsweredQuestion {
    pub question_id: i64,
    pub content: String,
    pub choice_id: i64,
    pub correct_choice_id: Option<i64>,
}

/// Final result of a sitting.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultView {
    pub sitting_id: i64,
    pub score: i32,
    pub max_score: usize,
    pub percent: u8,
    pub passed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_with_answers: Option<Vec<AnsweredQuestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incorrect_questions: Option<Vec<i64>>,
}

/// DTO for a grader marking a question wrong.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct MarkIncorrectRequest {
    #[validate(range(min = 1, message = "question_id must be positive"))]
    pub question_id: i64,
}

/// A grader-facing view of a sitting after a correction.
#[derive(Debug, Serialize, Deserialize)]
pub struct SittingScore {
    pub sitting_id: i64,
    pub score: i32,
    pub percent: u8,
    pub incorrect_questions: Vec<i64>,
}

impl From<&Sitting> for SittingScore {
    fn from(sitting: &Sitting) -> Self {
        Self {
            sitting_id: sitting.id(),
            score: sitting.current_score(),
            percent: sitting.percent_correct(),
            incorrect_questions: sitting.incorrect().to_vec(),
        }
    }
}

/// One completed sitting in the user's exam history.
#[derive(Debug, Serialize, Deserialize)]
pub struct SittingSummary {
    pub sitting_id: i64,
    pub quiz_id: i64,
    pub course_id: i64,
    pub score: i32,
    pub max_score: usize,
    pub percent: u8,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Sitting> for SittingSummary {
    fn from(sitting: &Sitting) -> Self {
        let record = sitting.record();
        Self {
            sitting_id: record.id,
            quiz_id: record.quiz_id,
            course_id: record.course_id,
            score: record.current_score,
            max_score: sitting.max_score(),
            percent: sitting.percent_correct(),
            started_at: record.started_at,
            ended_at: record.ended_at,
        }
    }
}
