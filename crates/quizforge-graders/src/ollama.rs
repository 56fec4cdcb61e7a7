//! Ollama (local LLM) grading backend.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use quizforge_core::traits::{
    extract_json_payload, grading_user_prompt, GradeRequest, GradeResponse, Grader,
    GRADING_SYSTEM_PROMPT,
};

use crate::error::GraderError;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT_SECS: u64 = 300; // Local models are slower

/// Ollama local LLM grading backend.
pub struct OllamaGrader {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaGrader {
    pub fn new(base_url: &str, model: &str) -> Self {
        let base = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base.to_string(),
            model: model.to_string(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Verdict {
    score_percent: i64,
    #[serde(default)]
    comment: String,
}

#[async_trait]
impl Grader for OllamaGrader {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeResponse> {
        let start = Instant::now();

        let body = OllamaRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: GRADING_SYSTEM_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: grading_user_prompt(request),
                },
            ],
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GraderError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else if e.is_connect() {
                    GraderError::NetworkError(format!(
                        "Ollama not reachable at {}. Is it running? Start with: ollama serve",
                        self.base_url
                    ))
                } else {
                    GraderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(GraderError::ModelNotFound(format!(
                "Model '{}' not found locally. Pull it with: ollama pull {}",
                self.model, self.model
            ))
            .into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GraderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: OllamaResponse = response.json().await.map_err(|e| {
            GraderError::MalformedResponse(format!("failed to parse response: {e}"))
        })?;

        let payload = extract_json_payload(&api_response.message.content);
        let verdict: Verdict = serde_json::from_str(payload)
            .map_err(|e| GraderError::MalformedResponse(format!("{e}: {payload}")))?;

        tracing::debug!(
            score = verdict.score_percent,
            latency_ms = start.elapsed().as_millis() as u64,
            "grading verdict received"
        );
        Ok(GradeResponse {
            score_percent: verdict.score_percent.clamp(0, 100) as u8,
            comment: verdict.comment,
        }
        .clamped())
    }
}
