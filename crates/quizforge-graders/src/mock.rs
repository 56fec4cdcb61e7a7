//! Mock grader for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use quizforge_core::traits::{GradeRequest, GradeResponse, Grader};

/// A mock grading backend for testing the engine without real API calls.
///
/// Returns configurable scores based on candidate-text substring
/// matching, and can be switched into an always-failing mode to
/// exercise the fallback path.
pub struct MockGrader {
    /// Map of candidate-text substring → score.
    scores: HashMap<String, u8>,
    /// Default score if no substring matches.
    default_score: u8,
    /// When true, every call fails.
    always_fail: bool,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GradeRequest>>,
}

impl MockGrader {
    /// Create a mock with the given substring→score mappings.
    pub fn new(scores: HashMap<String, u8>) -> Self {
        Self {
            scores,
            default_score: 0,
            always_fail: false,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same score.
    pub fn with_fixed_score(score: u8) -> Self {
        Self {
            scores: HashMap::new(),
            default_score: score,
            always_fail: false,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock whose every call fails.
    pub fn failing() -> Self {
        Self {
            scores: HashMap::new(),
            default_score: 0,
            always_fail: true,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Get the number of calls made to this grader.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this grader.
    pub fn last_request(&self) -> Option<GradeRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Grader for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if self.always_fail {
            anyhow::bail!("mock grader configured to fail");
        }

        let score = self
            .scores
            .iter()
            .find(|(key, _)| request.candidate_text.contains(key.as_str()))
            .map(|(_, &score)| score)
            .unwrap_or(self.default_score);

        Ok(GradeResponse {
            score_percent: score,
            comment: format!("mock grade: {score}"),
        }
        .clamped())
    }
}
