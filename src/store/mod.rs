// src/store/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        attempt::GradedAttempt,
        lesson_plan::{LessonParent, LessonPlan},
        progress::Progress,
        question::Quiz,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence port for everything the grading and mastery engine reads or writes.
///
/// All lookups are scoped to the owning student.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Option<Progress>, AppError>;

    /// Conditional upsert.
    ///
    /// Succeeds only if the stored version still equals `progress.version`
    /// (0 meaning "no row yet"). Returns the stored record with its new
    /// version, or `AppError::Conflict` when another writer got there first.
    async fn save_progress(&self, progress: &Progress) -> Result<Progress, AppError>;

    async fn list_progress(&self, student_id: &str) -> Result<Vec<Progress>, AppError>;

    async fn load_lesson_plan(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Option<LessonPlan>, AppError>;

    async fn resolve_lesson_parent(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonParent>, AppError>;

    /// Plan an attempt belongs to, found through its lesson.
    async fn resolve_attempt_parent(
        &self,
        attempt: &GradedAttempt,
    ) -> Result<Option<String>, AppError> {
        Ok(self
            .resolve_lesson_parent(&attempt.student_id, &attempt.lesson_id)
            .await?
            .map(|parent| parent.lesson_plan_id))
    }

    async fn load_quiz(&self, student_id: &str, quiz_id: &str) -> Result<Option<Quiz>, AppError>;

    /// Same contract as `save_progress`, and records `attempt` in the same
    /// write. Either both land or neither does.
    async fn save_progress_with_attempt(
        &self,
        progress: &Progress,
        attempt: &GradedAttempt,
    ) -> Result<Progress, AppError>;
}
