// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::{
    error::AppError,
    models::{
        attempt::GradedAttempt,
        lesson_plan::{LessonParent, LessonPlan},
        progress::Progress,
        question::Quiz,
    },
};

type Key = (String, String);

#[derive(Default)]
struct Tables {
    progress: HashMap<Key, Progress>,
    lesson_plans: HashMap<Key, LessonPlan>,
    lessons: HashMap<Key, LessonParent>,
    quizzes: HashMap<Key, Quiz>,
    attempts: Vec<GradedAttempt>,
}

/// Process-local store with the same versioning contract as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn key(a: &str, b: &str) -> Key {
    (a.to_string(), b.to_string())
}

impl Tables {
    /// The record as it would be stored, if `progress.version` is current.
    fn check_version(&self, progress: &Progress) -> Result<Progress, AppError> {
        let current_version = self
            .progress
            .get(&key(&progress.student_id, &progress.lesson_plan_id))
            .map(|p| p.version)
            .unwrap_or(0);
        if current_version != progress.version {
            return Err(AppError::Conflict(format!(
                "Progress for plan {} changed (expected version {}, found {})",
                progress.lesson_plan_id, progress.version, current_version
            )));
        }

        Ok(Progress {
            version: current_version + 1,
            ..progress.clone()
        })
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_lesson_plan(&self, plan: LessonPlan) {
        let mut tables = self.tables.write().await;
        tables
            .lesson_plans
            .insert(key(&plan.student_id, &plan.id), plan);
    }

    pub async fn insert_lesson(&self, student_id: &str, lesson_id: &str, parent: LessonParent) {
        let mut tables = self.tables.write().await;
        tables.lessons.insert(key(student_id, lesson_id), parent);
    }

    pub async fn insert_quiz(&self, quiz: Quiz) {
        let mut tables = self.tables.write().await;
        tables.quizzes.insert(key(&quiz.student_id, &quiz.id), quiz);
    }

    /// Every recorded attempt of a student, oldest first.
    pub async fn attempts(&self, student_id: &str) -> Vec<GradedAttempt> {
        let tables = self.tables.read().await;
        tables
            .attempts
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Option<Progress>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.progress.get(&key(student_id, lesson_plan_id)).cloned())
    }

    async fn save_progress(&self, progress: &Progress) -> Result<Progress, AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables.check_version(progress)?;
        tables.progress.insert(
            key(&progress.student_id, &progress.lesson_plan_id),
            stored.clone(),
        );
        Ok(stored)
    }

    async fn save_progress_with_attempt(
        &self,
        progress: &Progress,
        attempt: &GradedAttempt,
    ) -> Result<Progress, AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables.check_version(progress)?;
        if tables.attempts.iter().any(|a| a.id == attempt.id) {
            return Err(AppError::Conflict(format!(
                "Attempt {} already recorded",
                attempt.id
            )));
        }

        tables.progress.insert(
            key(&progress.student_id, &progress.lesson_plan_id),
            stored.clone(),
        );
        tables.attempts.push(attempt.clone());
        Ok(stored)
    }

    async fn list_progress(&self, student_id: &str) -> Result<Vec<Progress>, AppError> {
        let tables = self.tables.read().await;
        let mut records: Vec<Progress> = tables
            .progress
            .values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.lesson_plan_id.cmp(&b.lesson_plan_id));
        Ok(records)
    }

    async fn load_lesson_plan(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Option<LessonPlan>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .lesson_plans
            .get(&key(student_id, lesson_plan_id))
            .cloned())
    }

    async fn resolve_lesson_parent(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonParent>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.lessons.get(&key(student_id, lesson_id)).cloned())
    }

    async fn load_quiz(&self, student_id: &str, quiz_id: &str) -> Result<Option<Quiz>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.quizzes.get(&key(student_id, quiz_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::lesson_plan::LessonPlanItem;

    fn plan() -> LessonPlan {
        LessonPlan {
            id: "plan-1".to_string(),
            student_id: "alice".to_string(),
            subject: "Biology".to_string(),
            topic: "Cells".to_string(),
            structure: vec![LessonPlanItem {
                subtopic_id: "sub-1".to_string(),
                title: "Organelles".to_string(),
                order: 1,
            }],
        }
    }

    #[tokio::test]
    async fn test_save_progress_bumps_version() {
        let store = MemoryStore::new();
        let fresh = Progress::for_plan("alice", &plan());

        let saved = store.save_progress(&fresh).await.unwrap();
        assert_eq!(saved.version, 1);

        let loaded = store.load_progress("alice", "plan-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_save_progress_rejects_stale_version() {
        let store = MemoryStore::new();
        let fresh = Progress::for_plan("alice", &plan());
        store.save_progress(&fresh).await.unwrap();

        // Still carries version 0, so it lost the race.
        let err = store.save_progress(&fresh).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_lookups_are_scoped_to_student() {
        let store = MemoryStore::new();
        store.insert_lesson_plan(plan()).await;

        assert!(store.load_lesson_plan("alice", "plan-1").await.unwrap().is_some());
        assert!(store.load_lesson_plan("bob", "plan-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_attempt_write_records_nothing() {
        use crate::models::attempt::{AttemptScore, GradedAttempt};

        let store = MemoryStore::new();
        let fresh = Progress::for_plan("alice", &plan());
        store.save_progress(&fresh).await.unwrap();

        let attempt = GradedAttempt {
            id: "attempt-1".to_string(),
            student_id: "alice".to_string(),
            quiz_id: "quiz-1".to_string(),
            lesson_id: "lesson-1".to_string(),
            subtopic_id: "sub-1".to_string(),
            responses: vec![],
            score: AttemptScore::default(),
            completed_at: chrono::Utc::now(),
        };

        let err = store
            .save_progress_with_attempt(&fresh, &attempt)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.attempts("alice").await.is_empty());

        let current = store.load_progress("alice", "plan-1").await.unwrap().unwrap();
        let saved = store
            .save_progress_with_attempt(&current, &attempt)
            .await
            .unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(store.attempts("alice").await.len(), 1);
    }
}
