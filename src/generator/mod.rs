// src/generator/mod.rs

pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;

pub use openai::OpenAiGenerator;

/// Everything the generator needs to mark one free-text answer.
#[derive(Debug, Clone, Copy)]
pub struct FreeTextGradeRequest<'a> {
    pub question: &'a str,
    pub mark_scheme: &'a [String],
    pub max_marks: f64,
    pub student_answer: &'a str,
}

/// Marks proposed by the generator. Not trusted to respect `max_marks`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeTextGrade {
    pub marks_awarded: f64,
    pub feedback: String,
    #[serde(default)]
    pub generated_answer: Option<String>,
}

/// AI-assisted content capabilities consumed by the grading engine.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn grade_free_text(
        &self,
        request: FreeTextGradeRequest<'_>,
    ) -> Result<FreeTextGrade, AppError>;
}
