// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Graded result for one question of an attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttemptResponse {
    pub question_id: String,
    pub user_answer: String,

    /// Always within `0..=max_marks`.
    pub marks_awarded: f64,
    pub max_marks: f64,

    /// Only set for multiple choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,

    pub feedback: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_generated_answer: Option<String>,

    /// True when automatic grading failed and the zero-mark fallback was used.
    #[serde(default)]
    pub grading_degraded: bool,
}

/// Aggregate score of an attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptScore {
    pub correct_count: u32,
    pub total_questions: u32,
    pub percentage: f64,
    pub marks_awarded: f64,
    pub max_marks: f64,
    pub trigger_tutor: bool,
    pub weak_concepts: Vec<String>,
}

/// One graded quiz submission. Never mutated once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAttempt {
    pub id: String,
    pub student_id: String,
    pub quiz_id: String,
    pub lesson_id: String,
    pub subtopic_id: String,
    pub responses: Vec<QuizAttemptResponse>,
    pub score: AttemptScore,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl GradedAttempt {
    pub fn is_degraded(&self) -> bool {
        self.responses.iter().any(|r| r.grading_degraded)
    }
}

/// A raw answer as submitted by the student.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    #[validate(length(min = 1, max = 100))]
    pub question_id: String,
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub user_answer: String,
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(length(max = 200), nested)]
    pub responses: Vec<SubmittedAnswer>,
}

/// Result returned after a submission has been graded and recorded.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizResponse {
    pub attempt: GradedAttempt,
    pub mastery_level: Option<crate::models::progress::MasteryLevel>,
    /// "tutor" when the attempt escalates, otherwise "continue".
    pub next_action: &'static str,
}
