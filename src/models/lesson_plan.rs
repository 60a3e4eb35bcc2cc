// src/models/lesson_plan.rs

use serde::{Deserialize, Serialize};

/// One planned subtopic inside a lesson plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlanItem {
    pub subtopic_id: String,
    pub title: String,
    pub order: i32,
}

/// Lesson plan metadata as produced by the content generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlan {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub topic: String,
    pub structure: Vec<LessonPlanItem>,
}

/// Where a lesson sits: its plan and the subtopic it teaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonParent {
    pub lesson_plan_id: String,
    pub subtopic_id: String,
}
