//! Final report compilation with JSON persistence.
//!
//! Compiles a finished session into an immutable, reviewable report.
//! Correctness is recomputed here rather than trusted from earlier
//! checks: closed-form questions go through the exact-match evaluator
//! again, and free-text gradings are honored only while the graded text
//! still equals the recorded answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use anyhow::{Context, Result};

use crate::evaluator;
use crate::model::{Answer, Question, QuestionKind, Settings};
use crate::session::Session;

/// Comment attached when a stored grading no longer matches the answer.
pub const STALE_COMMENT: &str = "evaluation is stale; the answer changed after grading";

/// Comment attached when a free-text answer was never graded.
pub const UNGRADED_COMMENT: &str = "answer was not graded";

/// The compiled outcome of one finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was compiled.
    pub created_at: DateTime<Utc>,
    /// The test this session ran against.
    pub test_id: String,
    /// Number of active questions.
    pub total: u32,
    /// Number answered correctly.
    pub correct: u32,
    /// `round(correct / total * 100)`.
    pub percentage: u8,
    /// Wall-clock seconds from start to finish.
    pub elapsed_secs: u64,
    /// Effective pass threshold, clamped into `[1, total]`.
    pub pass_threshold: u32,
    /// Whether `correct >= pass_threshold`.
    pub passed: bool,
    /// The settings the session ran with.
    pub settings: Settings,
    /// Per-question outcome ledger, in session order.
    pub ledger: Vec<AnswerRecord>,
    /// Missed closed-form questions, present only when the settings
    /// enable the end-of-test review.
    pub incorrect_review: Option<Vec<IncorrectSummary>>,
    /// Grading transcript for every free-text question.
    pub transcripts: Vec<FreeTextTranscript>,
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub answer: Option<Answer>,
    pub correct: bool,
    pub score_percent: Option<u8>,
    pub comment: Option<String>,
}

/// Review entry for a missed closed-form question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncorrectSummary {
    pub question_id: String,
    pub question_text: String,
    /// The correct answer, rendered one line per option or pair.
    pub correct_answers: Vec<String>,
}

/// Grading transcript entry for a free-text question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeTextTranscript {
    pub question_id: String,
    pub question_text: String,
    pub answer_text: String,
    pub correct: bool,
    pub score_percent: u8,
    pub comment: Option<String>,
}

/// Compile a session snapshot into a report. Pure with respect to its
/// inputs; `now` is the finish timestamp supplied by the caller.
pub fn compile(session: &Session, questions: &[Question], now: DateTime<Utc>) -> TestReport {
    let total = questions.len() as u32;
    let pass_threshold = session
        .settings
        .pass_threshold
        .clamp(1, total.max(1));

    let mut correct_count = 0u32;
    let mut ledger = Vec::with_capacity(questions.len());
    let mut incorrect = Vec::new();
    let mut transcripts = Vec::new();

    for question in questions {
        let answer = session.answers.get(&question.id);
        let record = if question.is_free_text() {
            let record = compile_free_text(session, question, answer);
            transcripts.push(FreeTextTranscript {
                question_id: question.id.clone(),
                question_text: question.text.clone(),
                answer_text: answer.map(|a| a.text().to_string()).unwrap_or_default(),
                correct: record.correct,
                score_percent: record.score_percent.unwrap_or(0),
                comment: record.comment.clone(),
            });
            record
        } else {
            let is_right = answer.is_some_and(|a| evaluator::is_correct(question, a));
            if !is_right {
                incorrect.push(IncorrectSummary {
                    question_id: question.id.clone(),
                    question_text: question.text.clone(),
                    correct_answers: render_correct_answer(question),
                });
            }
            AnswerRecord {
                question_id: question.id.clone(),
                answer: answer.cloned(),
                correct: is_right,
                score_percent: Some(if is_right { 100 } else { 0 }),
                comment: None,
            }
        };

        if record.correct {
            correct_count += 1;
        }
        ledger.push(record);
    }

    let percentage = if total == 0 {
        0
    } else {
        ((correct_count as f64 / total as f64) * 100.0).round() as u8
    };

    TestReport {
        id: Uuid::new_v4(),
        created_at: now,
        test_id: session.test_id.clone(),
        total,
        correct: correct_count,
        percentage,
        elapsed_secs: (now - session.started_at).num_seconds().max(0) as u64,
        pass_threshold,
        passed: correct_count >= pass_threshold,
        settings: session.settings.clone(),
        ledger,
        incorrect_review: session.settings.show_incorrect_at_end.then_some(incorrect),
        transcripts,
    }
}

fn compile_free_text(
    session: &Session,
    question: &Question,
    answer: Option<&Answer>,
) -> AnswerRecord {
    let Some(answer) = answer else {
        return AnswerRecord {
            question_id: question.id.clone(),
            answer: None,
            correct: false,
            score_percent: Some(0),
            comment: None,
        };
    };

    let (correct, score, comment) = match session.evaluations.get(&question.id) {
        // A stored grading counts only while it graded this exact text.
        Some(stored) if stored.graded_text == answer.text() => (
            stored.evaluation.correct,
            stored.evaluation.score_percent,
            stored.evaluation.comment.clone(),
        ),
        Some(_) => (false, 0, Some(STALE_COMMENT.to_string())),
        None => (false, 0, Some(UNGRADED_COMMENT.to_string())),
    };

    AnswerRecord {
        question_id: question.id.clone(),
        answer: Some(answer.clone()),
        correct,
        score_percent: Some(score),
        comment,
    }
}

/// Render the correct answer of a closed-form question for review.
fn render_correct_answer(question: &Question) -> Vec<String> {
    match &question.kind {
        QuestionKind::Single { options, correct }
        | QuestionKind::Multiple { options, correct } => correct
            .iter()
            .filter_map(|&i| options.get(i).cloned())
            .collect(),
        QuestionKind::Matching {
            terms,
            meanings,
            correct,
        } => correct
            .iter()
            .map(|pair| {
                let term_text = terms
                    .iter()
                    .find(|t| t.id == pair.term)
                    .map_or(pair.term.as_str(), |t| t.text.as_str());
                let meaning_text = meanings
                    .iter()
                    .find(|m| m.id == pair.meaning)
                    .map_or(pair.meaning.as_str(), |m| m.text.as_str());
                format!("{}: {} — {}", pair.term, term_text, meaning_text)
            })
            .collect(),
        QuestionKind::FreeText { .. } => Vec::new(),
    }
}

impl TestReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: TestReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Evaluation;
    use crate::model::{MatchItem, PairKey, SessionMode};
    use crate::session::StoredEvaluation;
    use std::collections::{BTreeSet, HashMap};

    fn single(id: &str, correct: usize) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            kind: QuestionKind::Single {
                options: vec!["alpha".into(), "beta".into(), "gamma".into()],
                correct: BTreeSet::from([correct]),
            },
        }
    }

    fn free_text(id: &str) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            kind: QuestionKind::FreeText {
                accepted: vec!["Pacific".into()],
            },
        }
    }

    fn session_with(
        questions: &[Question],
        answers: &[(&str, Answer)],
        evaluations: &[(&str, StoredEvaluation)],
    ) -> Session {
        Session {
            test_id: "test".into(),
            mode: SessionMode::Standard,
            subset: None,
            position: 0,
            answers: answers
                .iter()
                .map(|(id, a)| (id.to_string(), a.clone()))
                .collect(),
            evaluations: evaluations
                .iter()
                .map(|(id, e)| (id.to_string(), e.clone()))
                .collect(),
            started_at: Utc::now(),
            time_limit_secs: None,
            settings: Settings::defaults_for(questions.len()),
            auto_finished: false,
        }
    }

    fn pick(i: usize) -> Answer {
        Answer::Choices(BTreeSet::from([i]))
    }

    #[test]
    fn four_question_scenario() {
        // 4 single-choice, 3 right and 1 wrong: 75%, threshold 4, fail.
        let questions: Vec<_> = (0..4).map(|i| single(&format!("q{i}"), 0)).collect();
        let session = session_with(
            &questions,
            &[("q0", pick(0)), ("q1", pick(0)), ("q2", pick(0)), ("q3", pick(1))],
            &[],
        );
        let report = compile(&session, &questions, Utc::now());
        assert_eq!(report.total, 4);
        assert_eq!(report.correct, 3);
        assert_eq!(report.percentage, 75);
        assert_eq!(report.pass_threshold, 4);
        assert!(!report.passed);
    }

    #[test]
    fn threshold_clamped_to_total() {
        let questions = vec![single("q0", 0)];
        let mut session = session_with(&questions, &[("q0", pick(0))], &[]);
        session.settings.pass_threshold = 10;
        let report = compile(&session, &questions, Utc::now());
        assert_eq!(report.pass_threshold, 1);
        assert!(report.passed);
    }

    #[test]
    fn stale_grading_is_rejected() {
        let questions = vec![free_text("q0")];
        let stored = StoredEvaluation {
            evaluation: Evaluation {
                correct: true,
                score_percent: 90,
                comment: Some("good".into()),
            },
            graded_text: "X".into(),
        };
        // Answer edited to "Y" after grading "X".
        let session = session_with(&questions, &[("q0", Answer::Text("Y".into()))], &[("q0", stored)]);
        let report = compile(&session, &questions, Utc::now());
        assert_eq!(report.correct, 0);
        assert_eq!(report.ledger[0].score_percent, Some(0));
        assert_eq!(report.ledger[0].comment.as_deref(), Some(STALE_COMMENT));
        assert_eq!(report.transcripts[0].comment.as_deref(), Some(STALE_COMMENT));
    }

    #[test]
    fn fresh_grading_is_honored() {
        let questions = vec![free_text("q0")];
        let stored = StoredEvaluation {
            evaluation: Evaluation {
                correct: true,
                score_percent: 90,
                comment: Some("good".into()),
            },
            graded_text: "the pacific".into(),
        };
        let session = session_with(
            &questions,
            &[("q0", Answer::Text("the pacific".into()))],
            &[("q0", stored)],
        );
        let report = compile(&session, &questions, Utc::now());
        assert_eq!(report.correct, 1);
        assert_eq!(report.transcripts[0].score_percent, 90);
    }

    #[test]
    fn ungraded_free_text_is_incorrect() {
        let questions = vec![free_text("q0")];
        let session = session_with(&questions, &[("q0", Answer::Text("pacific".into()))], &[]);
        let report = compile(&session, &questions, Utc::now());
        assert_eq!(report.correct, 0);
        assert_eq!(report.ledger[0].comment.as_deref(), Some(UNGRADED_COMMENT));
    }

    #[test]
    fn incorrect_review_excludes_free_text() {
        let questions = vec![single("q0", 0), free_text("q1")];
        let session = session_with(&questions, &[("q0", pick(2))], &[]);
        let report = compile(&session, &questions, Utc::now());
        let review = report.incorrect_review.unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].question_id, "q0");
        // Free-text questions get the transcript instead.
        assert_eq!(report.transcripts.len(), 1);
        assert_eq!(report.transcripts[0].question_id, "q1");
    }

    #[test]
    fn incorrect_review_gated_by_settings() {
        let questions = vec![single("q0", 0)];
        let mut session = session_with(&questions, &[], &[]);
        session.settings.show_incorrect_at_end = false;
        let report = compile(&session, &questions, Utc::now());
        assert!(report.incorrect_review.is_none());
    }

    #[test]
    fn choice_review_renders_correct_options_in_index_order() {
        let question = Question {
            id: "q0".into(),
            text: "?".into(),
            kind: QuestionKind::Multiple {
                options: vec!["alpha".into(), "beta".into(), "gamma".into()],
                correct: BTreeSet::from([2, 0]),
            },
        };
        let lines = render_correct_answer(&question);
        assert_eq!(lines, vec!["alpha".to_string(), "gamma".to_string()]);
    }

    #[test]
    fn matching_review_renders_pairs() {
        let question = Question {
            id: "q0".into(),
            text: "?".into(),
            kind: QuestionKind::Matching {
                terms: vec![MatchItem {
                    id: "t1".into(),
                    text: "ephemeral".into(),
                }],
                meanings: vec![MatchItem {
                    id: "m1".into(),
                    text: "short-lived".into(),
                }],
                correct: BTreeSet::from([PairKey {
                    term: "t1".into(),
                    meaning: "m1".into(),
                }]),
            },
        };
        let lines = render_correct_answer(&question);
        assert_eq!(lines, vec!["t1: ephemeral — short-lived".to_string()]);
    }

    #[test]
    fn json_roundtrip() {
        let questions = vec![single("q0", 0)];
        let session = session_with(&questions, &[("q0", pick(0))], &[]);
        let report = compile(&session, &questions, Utc::now());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.save_json(&path).unwrap();
        let loaded = TestReport::load_json(&path).unwrap();
        assert_eq!(loaded.test_id, "test");
        assert_eq!(loaded.correct, 1);
        assert_eq!(loaded.id, report.id);
    }
}
