//! Polymorphic evaluation dispatch.
//!
//! Routes closed-form questions to the exact-match evaluator and
//! free-text questions to the external grading backend. Grader failures
//! never reach the caller: the dispatcher falls back to exact matching
//! and flags the result, so evaluation always completes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::evaluator;
use crate::model::{Answer, Question, QuestionKind, Settings};
use crate::traits::{GradeRequest, Grader};

/// Score at or above which a graded free-text answer counts as correct.
pub const DEFAULT_CORRECT_THRESHOLD: u8 = 70;

/// Comment attached when the empty-answer short circuit fires.
pub const EMPTY_ANSWER_COMMENT: &str = "empty answer";

/// Comment attached when grading used the deterministic fallback.
pub const FALLBACK_COMMENT: &str = "graded with exact-match fallback; semantic grader unavailable";

/// Outcome of evaluating one answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the answer counts as correct.
    pub correct: bool,
    /// Score in percent (100 or 0 for closed-form questions).
    pub score_percent: u8,
    /// Optional human-readable grading comment.
    pub comment: Option<String>,
}

impl Evaluation {
    fn exact(correct: bool) -> Self {
        Self {
            correct,
            score_percent: if correct { 100 } else { 0 },
            comment: None,
        }
    }
}

/// Evaluation router over question kinds.
pub struct Dispatcher {
    grader: Arc<dyn Grader>,
    correct_threshold: u8,
}

impl Dispatcher {
    pub fn new(grader: Arc<dyn Grader>) -> Self {
        Self {
            grader,
            correct_threshold: DEFAULT_CORRECT_THRESHOLD,
        }
    }

    /// Override the correctness threshold (clamped into 0..=100).
    pub fn with_correct_threshold(mut self, threshold: u8) -> Self {
        self.correct_threshold = threshold.min(100);
        self
    }

    /// Evaluate an answer. Infallible: suspends only on the free-text
    /// grading call, and converts any grader failure into the fallback.
    pub async fn evaluate(
        &self,
        question: &Question,
        answer: &Answer,
        settings: &Settings,
    ) -> Evaluation {
        let accepted = match &question.kind {
            QuestionKind::FreeText { accepted } => accepted,
            _ => return Evaluation::exact(evaluator::is_correct(question, answer)),
        };

        let text = answer.text();
        if evaluator::normalize_text(text).is_empty() {
            return Evaluation {
                correct: false,
                score_percent: 0,
                comment: Some(EMPTY_ANSWER_COMMENT.to_string()),
            };
        }

        let request = GradeRequest {
            question_text: question.text.clone(),
            accepted_answers: accepted.clone(),
            candidate_text: text.to_string(),
            strictness: settings.strictness,
        };

        match self.grader.grade(&request).await {
            Ok(response) => {
                let score = response.score_percent.min(100);
                Evaluation {
                    correct: score >= self.correct_threshold,
                    score_percent: score,
                    comment: if response.comment.is_empty() {
                        None
                    } else {
                        Some(response.comment)
                    },
                }
            }
            Err(e) => {
                tracing::warn!(
                    grader = self.grader.name(),
                    question = %question.id,
                    "grading failed, using exact-match fallback: {e:#}"
                );
                let correct = evaluator::text_matches(text, accepted);
                Evaluation {
                    correct,
                    score_percent: if correct { 100 } else { 0 },
                    comment: Some(FALLBACK_COMMENT.to_string()),
                }
            }
        }
    }
}
