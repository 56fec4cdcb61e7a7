//! Session engine, evaluation, and scoring for quizforge.
//!
//! This crate defines the question/answer data model, the exact-match
//! evaluator, the evaluation dispatcher with its grader fallback, the
//! session state machine, the result compiler, and the sub-test sampler.

pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod report;
pub mod sampler;
pub mod session;
pub mod store;
pub mod traits;
