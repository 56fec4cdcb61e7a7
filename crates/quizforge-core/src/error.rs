//! Grader error types.
//!
//! These error types represent failures when talking to an external
//! grading backend. Defined in `quizforge-core` so the dispatcher can
//! classify failures without string matching; every one of them routes
//! to the deterministic fallback, never to the caller.

use thiserror::Error;

/// Errors that can occur when interacting with a grading backend.
#[derive(Debug, Error)]
pub enum GraderError {
    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The backend answered but the verdict could not be parsed.
    #[error("malformed grading response: {0}")]
    MalformedResponse(String),
}
