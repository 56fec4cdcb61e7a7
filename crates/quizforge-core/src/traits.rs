//! Collaborator trait definitions.
//!
//! The grading trait is async and implemented by the `quizforge-graders`
//! crate; persistence, question-data, and statistics collaborators are
//! synchronous call contracts implemented by the surrounding application.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Question, QuestionSet, Strictness};
use crate::report::TestReport;
use crate::session::Session;

// ---------------------------------------------------------------------------
// Grader trait
// ---------------------------------------------------------------------------

/// Trait for external backends that grade free-text answers.
#[async_trait]
pub trait Grader: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Grade a candidate answer against the accepted answers.
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeResponse>;
}

/// Request to grade a free-text answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    /// The question prompt.
    pub question_text: String,
    /// Reference answers considered fully correct.
    pub accepted_answers: Vec<String>,
    /// The user's answer text.
    pub candidate_text: String,
    /// How strictly to grade.
    pub strictness: Strictness,
}

/// Verdict from a grading backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeResponse {
    /// Score in percent, clamped into 0..=100 by the backend.
    pub score_percent: u8,
    /// Human-readable grading comment.
    pub comment: String,
}

impl GradeResponse {
    /// Clamp the score into the valid range. Backends call this on any
    /// nominally successful response before returning it.
    pub fn clamped(mut self) -> Self {
        self.score_percent = self.score_percent.min(100);
        self
    }
}

// ---------------------------------------------------------------------------
// Persistence trait
// ---------------------------------------------------------------------------

/// Key-value persistence for the live session and the compiled report.
///
/// Loads return `None` for missing, corrupt, or mismatched state rather
/// than erroring; save failures are reported so the controller can log
/// and carry on.
pub trait SessionStore: Send + Sync {
    fn load_session(&self) -> Option<Session>;
    fn save_session(&self, session: &Session) -> anyhow::Result<()>;
    fn clear_session(&self);

    /// Load the stored report, or `None` if absent or stored for a
    /// different test id.
    fn load_result(&self, test_id: &str) -> Option<TestReport>;
    fn save_result(&self, test_id: &str, report: &TestReport) -> anyhow::Result<()>;
    fn clear_result(&self);
}

// ---------------------------------------------------------------------------
// Question data trait
// ---------------------------------------------------------------------------

/// Supplies the immutable question pool for a test id.
pub trait QuestionSource: Send + Sync {
    fn questions(&self, test_id: &str) -> anyhow::Result<Vec<Question>>;
}

impl QuestionSource for QuestionSet {
    fn questions(&self, test_id: &str) -> anyhow::Result<Vec<Question>> {
        if self.id != test_id {
            anyhow::bail!("unknown test id: {test_id}");
        }
        Ok(self.questions.clone())
    }
}

// ---------------------------------------------------------------------------
// Statistics trait
// ---------------------------------------------------------------------------

/// Session lifecycle event reported to the statistics collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatsEvent {
    Started {
        test_id: String,
        percentage: u8,
    },
    Finished {
        test_id: String,
        right_answers: u32,
        wrong_answers: u32,
        percentage: u8,
        time_taken_secs: u64,
    },
}

/// Fire-and-forget statistics reporting. Failures are logged by the
/// caller and never affect session state.
pub trait StatsSink: Send + Sync {
    fn record(&self, event: &StatsEvent) -> anyhow::Result<()>;
}

/// No-op statistics sink.
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn record(&self, _: &StatsEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Grading prompt
// ---------------------------------------------------------------------------

/// System prompt for grading backends.
pub const GRADING_SYSTEM_PROMPT: &str = "You are an exam grader. Compare the student's answer to the reference answers and award a score from 0 to 100 for semantic correctness. Respond ONLY with a JSON object of the form {\"score_percent\": <0-100>, \"comment\": \"<one short sentence>\"}. No other text.";

/// Build the user-visible part of a grading prompt.
pub fn grading_user_prompt(request: &GradeRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Question: {}\n\n", request.question_text));
    prompt.push_str("Reference answers:\n");
    for answer in &request.accepted_answers {
        prompt.push_str(&format!("- {answer}\n"));
    }
    prompt.push_str(&format!("\nStudent answer: {}\n", request.candidate_text));
    prompt.push_str(&format!("\nGrading strictness: {}\n", request.strictness));
    prompt
}

// ---------------------------------------------------------------------------
// JSON payload extraction
// ---------------------------------------------------------------------------

/// Extract a JSON object from a possibly markdown-formatted LLM response.
///
/// Handles:
/// - ```json fenced blocks (first one wins)
/// - Generic ``` fenced blocks
/// - A bare JSON object embedded in prose (first `{` to last `}`)
/// - Raw JSON with no decoration (returned as-is)
pub fn extract_json_payload(response: &str) -> &str {
    let mut in_block = false;
    let mut block_matches = false;
    let mut start = None;

    for (offset, line) in line_offsets(response) {
        let trimmed = line.trim();
        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            block_matches = lang == "json" || lang.is_empty();
            start = None;
            continue;
        }
        if in_block && trimmed == "```" {
            if block_matches {
                if let Some(s) = start {
                    return response[s..offset].trim();
                }
            }
            in_block = false;
            continue;
        }
        if in_block && block_matches && start.is_none() {
            start = Some(offset);
        }
    }

    // Truncated fenced block: take what accumulated.
    if in_block && block_matches {
        if let Some(s) = start {
            return response[s..].trim();
        }
    }

    // JSON object embedded in prose.
    if let (Some(open), Some(close)) = (response.find('{'), response.rfind('}')) {
        if open < close {
            return &response[open..=close];
        }
    }

    response.trim()
}

fn line_offsets(s: &str) -> impl Iterator<Item = (usize, &str)> {
    s.split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line.trim_end_matches(['\n', '\r'])))
        })
}
