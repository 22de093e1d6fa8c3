// src/models/quiz.rs

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,

    /// Percentage required to pass, 0..=100.
    pub pass_mark: i16,

    /// Only one completed sitting per user/course. Implies `exam_paper`.
    pub single_attempt: bool,

    /// Completed sittings are kept for marking instead of being discarded.
    pub exam_paper: bool,

    /// Correctness feedback is withheld until the result view.
    pub answers_at_end: bool,
}

impl Quiz {
    /// Rejects pass marks outside 0..=100.
    pub fn check(&self) -> Result<(), AppError> {
        if !(0..=100).contains(&self.pass_mark) {
            return Err(AppError::Configuration(format!(
                "Quiz {} has pass mark {} outside 0..=100",
                self.id, self.pass_mark
            )));
        }
        Ok(())
    }

    /// Whether completed sittings must be retained.
    pub fn retains_sittings(&self) -> bool {
        self.exam_paper || self.single_attempt
    }

    /// Ledger category for answers given in this quiz.
    pub fn category(&self) -> String {
        self.id.to_string()
    }
}

/// How a question's choices are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceOrder {
    /// Sorted by choice text.
    Content,
    /// Shuffled on every read.
    Random,
    /// Storage order.
    #[default]
    None,
}

impl ChoiceOrder {
    /// Maps the nullable `choice_order` column. Unknown values fall back to storage order.
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some("content") => ChoiceOrder::Content,
            Some("random") => ChoiceOrder::Random,
            _ => ChoiceOrder::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Choice {
    pub id: i64,
    pub text: String,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub content: String,
    pub explanation: Option<String>,
    pub choice_order: ChoiceOrder,
    pub choices: Vec<Choice>,
}

impl Question {
    /// Choices in presentation order. `Random` yields a fresh permutation per call.
    pub fn ordered_choices(&self) -> Vec<&Choice> {
        let mut choices: Vec<&Choice> = self.choices.iter().collect();
        match self.choice_order {
            ChoiceOrder::Content => choices.sort_by(|a, b| a.text.cmp(&b.text)),
            ChoiceOrder::Random => choices.shuffle(&mut rand::rng()),
            ChoiceOrder::None => {}
        }
        choices
    }

    pub fn is_correct(&self, choice_id: i64) -> Result<bool, AppError> {
        self.choices
            .iter()
            .find(|c| c.id == choice_id)
            .map(|c| c.correct)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Choice {} does not belong to question {}",
                    choice_id, self.id
                ))
            })
    }

    pub fn correct_choice(&self) -> Option<i64> {
        self.choices.iter().find(|c| c.correct).map(|c| c.id)
    }
}

/// Read-only view over one quiz and its active questions, in quiz order.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    quiz: Quiz,
    questions: Vec<Question>,
}

impl QuestionBank {
    /// Questions without choices cannot be answered and are left out.
    pub fn new(quiz: Quiz, mut questions: Vec<Question>) -> Result<Self, AppError> {
        quiz.check()?;
        questions.retain(|q| !q.choices.is_empty());
        Ok(Self { quiz, questions })
    }

    pub fn quiz(&self) -> &Quiz {
        &self.quiz
    }

    pub fn question(&self, question_id: i64) -> Result<&Question, AppError> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Question {} is not part of quiz {}",
                    question_id, self.quiz.id
                ))
            })
    }

    /// Ordered ids of the quiz's active questions.
    ///
    /// A quiz without questions cannot be attempted.
    pub fn question_set(&self) -> Result<Vec<i64>, AppError> {
        if self.questions.is_empty() {
            return Err(AppError::Configuration(format!(
                "Question set of quiz {} is empty",
                self.quiz.id
            )));
        }
        Ok(self.questions.iter().map(|q| q.id).collect())
    }

    pub fn is_correct(&self, question_id: i64, choice_id: i64) -> Result<bool, AppError> {
        self.question(question_id)?.is_correct(choice_id)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

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

    /// Question `id` with choices `id*10+1` (correct) and `id*10+2`.
    pub fn question(id: i64) -> Question {
        Question {
            id,
            content: format!("Question {}", id),
            explanation: None,
            choice_order: ChoiceOrder::None,
            choices: vec![
                Choice { id: id * 10 + 1, text: "right".into(), correct: true },
                Choice { id: id * 10 + 2, text: "wrong".into(), correct: false },
            ],
        }
    }

    pub fn bank(quiz: Quiz, question_ids: &[i64]) -> QuestionBank {
        let questions = question_ids.iter().map(|&id| question(id)).collect();
        QuestionBank::new(quiz, questions).unwrap()
    }
}
