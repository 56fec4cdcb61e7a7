//! Grader error types.
//!
//! The taxonomy lives in `quizforge-core` so the dispatcher can
//! classify failures; re-exported here for backend implementations.

pub use quizforge_core::error::GraderError;
