// src/models/dashboard.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Per-plan row of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub lesson_plan_id: String,
    pub subject: String,
    pub topic: String,
    pub percent_complete: f64,
    pub average_score: f64,
    pub total_subtopics: u32,
    pub completed_subtopics: u32,
}

/// Totals across every plan a student has progress for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub total_subtopics: u32,
    pub completed_subtopics: u32,
    pub overall_percent_complete: f64,
    pub total_study_time: u64,
    /// Mean of plan averages, ignoring plans without attempts.
    pub overall_average_score: f64,
    pub lesson_plans: Vec<PlanSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub summary: ProgressSummary,
    pub recommendations: Vec<String>,
}

/// DTO for marking a lesson complete.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompleteLessonRequest {
    #[validate(range(max = 1440, message = "Study time must be at most one day."))]
    #[serde(default)]
    pub study_time_minutes: u32,
}
