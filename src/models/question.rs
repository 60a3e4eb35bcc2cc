// src/models/question.rs

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Kind of question. Only multiple choice is graded deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    ShortAnswer,
    LongAnswer,
}

impl QuestionType {
    /// Marks available when the generator did not specify any.
    pub fn default_max_marks(self) -> f64 {
        match self {
            QuestionType::MultipleChoice => 1.0,
            QuestionType::ShortAnswer => 3.0,
            QuestionType::LongAnswer => 6.0,
        }
    }

    pub fn is_free_text(self) -> bool {
        !matches!(self, QuestionType::MultipleChoice)
    }
}

/// A single quiz question. Immutable once the quiz is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,

    #[serde(rename = "type")]
    pub question_type: QuestionType,

    /// The question text shown to the student.
    pub prompt: String,

    /// Multiple choice only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,

    /// Ordered gradable points for free-text answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_scheme: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_marks: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl Question {
    /// Resolved max marks, falling back to the per-type default.
    pub fn max_marks(&self) -> f64 {
        self.max_marks
            .unwrap_or_else(|| self.question_type.default_max_marks())
    }

    pub fn mark_scheme(&self) -> &[String] {
        self.mark_scheme.as_deref().unwrap_or(&[])
    }

    /// Rejects questions whose explicit max marks is not a positive number.
    pub fn validate_marks(&self) -> Result<(), AppError> {
        match self.max_marks {
            Some(m) if !m.is_finite() || m <= 0.0 => Err(AppError::BadRequest(format!(
                "Question '{}' has invalid maxMarks {}",
                self.id, m
            ))),
            _ => Ok(()),
        }
    }
}

/// A generated quiz for one lesson's subtopic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub student_id: String,
    pub lesson_id: String,
    pub subtopic_id: String,
    pub questions: Vec<Question>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to the client (excludes answer and mark scheme).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub options: Option<Vec<String>>,
    pub max_marks: f64,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question_type: q.question_type,
            prompt: q.prompt.clone(),
            options: q.options.clone(),
            max_marks: q.max_marks(),
        }
    }
}
