// src/models/progress.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Increment applied to one ledger category after an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressDelta {
    pub category: String,
    pub score: u32,
    pub possible: u32,
}

/// Represents one row of the 'progress_scores' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryScore {
    pub category: String,
    pub score: i64,
    pub possible: i64,
}

/// A user's cumulative score across quizzes, one entry per category.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ProgressLedger {
    pub user_id: i64,
    pub scores: Vec<CategoryScore>,
}

impl ProgressLedger {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            scores: Vec::new(),
        }
    }

    /// Adds the delta to the matching category, or appends it as a new one.
    pub fn update(&mut self, delta: &ProgressDelta) {
        match self.scores.iter_mut().find(|s| s.category == delta.category) {
            Some(entry) => {
                entry.score += i64::from(delta.score);
                entry.possible += i64::from(delta.possible);
            }
            None => self.scores.push(CategoryScore {
                category: delta.category.clone(),
                score: i64::from(delta.score),
                possible: i64::from(delta.possible),
            }),
        }
    }

    pub fn get(&self, category: &str) -> Option<&CategoryScore> {
        self.scores.iter().find(|s| s.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(category: &str, score: u32, possible: u32) -> ProgressDelta {
        ProgressDelta {
            category: category.to_string(),
            score,
            possible,
        }
    }

    #[test]
    fn first_update_creates_category() {
        let mut ledger = ProgressLedger::new(7);
        ledger.update(&delta("3", 1, 1));

        assert_eq!(ledger.scores.len(), 1);
        assert_eq!(ledger.get("3").map(|s| (s.score, s.possible)), Some((1, 1)));
    }

    #[test]
    fn repeated_updates_accumulate_in_place() {
        let mut ledger = ProgressLedger::new(7);
        ledger.update(&delta("3", 1, 1));
        ledger.update(&delta("3", 0, 1));
        ledger.update(&delta("4", 1, 1));
        ledger.update(&delta("3", 1, 1));

        assert_eq!(ledger.scores.len(), 2);
        assert_eq!(ledger.get("3").map(|s| (s.score, s.possible)), Some((2, 3)));
        assert_eq!(ledger.get("4").map(|s| (s.score, s.possible)), Some((1, 1)));
    }

    #[test]
    fn category_match_is_exact() {
        let mut ledger = ProgressLedger::new(7);
        ledger.update(&delta("1", 1, 1));
        ledger.update(&delta("11", 1, 1));

        assert_eq!(ledger.scores.len(), 2);
        assert_eq!(ledger.get("1").map(|s| s.possible), Some(1));
    }
}
