//! Exact-match answer evaluation.
//!
//! Pure, total correctness checks for every question kind. Free-text
//! answers are compared after normalization; everything else is strict
//! set equality. A mismatched answer shape is simply incorrect.

use crate::model::{Answer, Question, QuestionKind};

/// Decide correctness of `answer` for `question`.
pub fn is_correct(question: &Question, answer: &Answer) -> bool {
    match (&question.kind, answer) {
        (QuestionKind::Single { correct, .. }, Answer::Choices(picked))
        | (QuestionKind::Multiple { correct, .. }, Answer::Choices(picked)) => picked == correct,
        (QuestionKind::Matching { correct, .. }, Answer::Pairs(picked)) => picked == correct,
        (QuestionKind::FreeText { accepted }, Answer::Text(text)) => {
            text_matches(text, accepted)
        }
        _ => false,
    }
}

/// Whether `text`, normalized, equals any accepted answer, normalized.
/// Empty normalized text never matches.
pub fn text_matches(text: &str, accepted: &[String]) -> bool {
    let candidate = normalize_text(text);
    if candidate.is_empty() {
        return false;
    }
    accepted.iter().any(|a| normalize_text(a) == candidate)
}

/// Normalize free text: trim, collapse internal whitespace, casefold.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
