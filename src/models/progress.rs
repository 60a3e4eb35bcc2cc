// src/models/progress.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::lesson_plan::LessonPlan;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    #[default]
    NotStarted,
    Beginner,
    Intermediate,
    Mastered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtopicStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Per-subtopic mastery statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtopicProgress {
    pub lesson_completed: bool,
    pub quiz_attempts: u32,
    /// Highest attempt percentage seen.
    pub best_score: f64,
    /// Running mean of every attempt percentage.
    pub average_score: f64,
    pub mastery_level: MasteryLevel,
    pub weak_concepts: Vec<String>,
    pub status: SubtopicStatus,
    pub last_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub total_subtopics: u32,
    pub completed_subtopics: u32,
    pub percent_complete: f64,
    /// Cumulative minutes, summed over every lesson completion call.
    pub total_study_time: u64,
    pub average_score: f64,
}

/// One student's progress through one lesson plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub student_id: String,
    pub lesson_plan_id: String,
    pub subtopic_progress: BTreeMap<String, SubtopicProgress>,
    pub overall_progress: OverallProgress,
    pub updated_at: chrono::DateTime<chrono::Utc>,

    /// Optimistic-concurrency counter; 0 means not yet persisted.
    #[serde(default)]
    pub version: i64,
}

impl Progress {
    /// Zeroed progress with one entry per subtopic in the plan structure.
    pub fn for_plan(student_id: &str, plan: &LessonPlan) -> Self {
        let subtopic_progress: BTreeMap<String, SubtopicProgress> = plan
            .structure
            .iter()
            .map(|item| (item.subtopic_id.clone(), SubtopicProgress::default()))
            .collect();

        Self {
            student_id: student_id.to_string(),
            lesson_plan_id: plan.id.clone(),
            overall_progress: OverallProgress {
                total_subtopics: subtopic_progress.len() as u32,
                ..OverallProgress::default()
            },
            subtopic_progress,
            updated_at: chrono::Utc::now(),
            version: 0,
        }
    }
}
