// src/generator/openai.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ContentGenerator, FreeTextGrade, FreeTextGradeRequest};
use crate::error::AppError;

const GRADER_SYSTEM_PROMPT: &str = "You are a fair, constructive GCSE examiner. \
Reply with a JSON object {\"marksAwarded\": number, \"feedback\": string}.";

/// Generator backed by any OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        tracing::info!("Content generator: {} at {}", model, base_url);

        Ok(Self {
            client,
            base_url,
            api_key,
            model: model.to_string(),
        })
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Generator returned {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream("Generator returned no content".to_string()))
    }
}

/// Builds the user prompt for grading a written answer.
fn grading_prompt(request: &FreeTextGradeRequest<'_>) -> String {
    let mark_scheme = request
        .mark_scheme
        .iter()
        .enumerate()
        .map(|(i, point)| format!("{}. {}", i + 1, point))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Grade this answer according to the mark scheme:\n\n\
         Question: {}\n\n\
         Mark Scheme ({} marks total):\n{}\n\n\
         Student Answer: {}\n\n\
         Award partial marks for partially correct points. \
         Provide constructive feedback on what was good and what was missing.",
        request.question, request.max_marks, mark_scheme, request.student_answer
    )
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn grade_free_text(
        &self,
        request: FreeTextGradeRequest<'_>,
    ) -> Result<FreeTextGrade, AppError> {
        let content = self
            .complete(GRADER_SYSTEM_PROMPT, grading_prompt(&request))
            .await?;

        serde_json::from_str::<FreeTextGrade>(&content).map_err(|e| {
            AppError::Upstream(format!("Unparseable grading response: {}", e))
        })
    }
}
