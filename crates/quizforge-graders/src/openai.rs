//! OpenAI-compatible API grading backend.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use quizforge_core::traits::{
    extract_json_payload, grading_user_prompt, GradeRequest, GradeResponse, Grader,
    GRADING_SYSTEM_PROMPT,
};

use crate::error::GraderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// OpenAI-compatible chat-completions grading backend.
pub struct OpenAiGrader {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiGrader {
    pub fn new(api_key: &str, base_url: Option<String>, model: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    temperature: f64,
    messages: Vec<OpenAiMessage>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    content: String,
}

/// The JSON verdict the grading prompt asks the model to emit.
#[derive(Deserialize)]
struct Verdict {
    score_percent: i64,
    #[serde(default)]
    comment: String,
}

fn parse_verdict(content: &str) -> Result<GradeResponse, GraderError> {
    let payload = extract_json_payload(content);
    let verdict: Verdict = serde_json::from_str(payload)
        .map_err(|e| GraderError::MalformedResponse(format!("{e}: {payload}")))?;
    Ok(GradeResponse {
        score_percent: verdict.score_percent.clamp(0, 100) as u8,
        comment: verdict.comment,
    }
    .clamped())
}

#[async_trait]
impl Grader for OpenAiGrader {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn grade(&self, request: &GradeRequest) -> anyhow::Result<GradeResponse> {
        let start = Instant::now();

        let body = OpenAiRequest {
            model: self.model.clone(),
            temperature: 0.0,
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: GRADING_SYSTEM_PROMPT.to_string(),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: grading_user_prompt(request),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GraderError::Timeout(DEFAULT_TIMEOUT_SECS)
                } else {
                    GraderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 401 {
            let body = response.text().await.unwrap_or_default();
            return Err(GraderError::AuthenticationFailed(body).into());
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(GraderError::ApiError {
                status,
                message: body,
            }
            .into());
        }

        let api_response: OpenAiResponse =
            response
                .json()
                .await
                .map_err(|e| GraderError::MalformedResponse(format!(
                    "failed to parse response: {e}"
                )))?;

        let content = api_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        let verdict = parse_verdict(content)?;

        tracing::debug!(
            score = verdict.score_percent,
            latency_ms = start.elapsed().as_millis() as u64,
            "grading verdict received"
        );
        Ok(verdict)
    }
}
