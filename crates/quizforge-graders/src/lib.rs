//! Grading backend integrations for quizforge.
//!
//! Implements the `Grader` trait for OpenAI-compatible APIs and local
//! Ollama instances, plus a scripted mock for testing the engine
//! without real API calls.

pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_grader, load_config, GraderConfig, QuizforgeConfig};
pub use error::GraderError;
