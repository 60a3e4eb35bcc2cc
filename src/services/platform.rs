// src/services/platform.rs

use std::sync::Arc;

use crate::{
    error::AppError,
    models::{
        attempt::{SubmitQuizResponse, SubmittedAnswer},
        dashboard::{DashboardResponse, ProgressSummary},
        lesson_plan::LessonPlan,
        progress::Progress,
        question::{PublicQuestion, Quiz},
    },
    services::{grader::AttemptGrader, mastery::MasteryTracker, recommendation},
    store::Store,
};

/// Sequences grading, progress tracking and recommendations for the request layer.
pub struct Platform {
    store: Arc<dyn Store>,
    grader: AttemptGrader,
    tracker: MasteryTracker,
}

impl Platform {
    pub fn new(store: Arc<dyn Store>, grader: AttemptGrader, tracker: MasteryTracker) -> Self {
        Self {
            store,
            grader,
            tracker,
        }
    }

    /// Questions of an existing quiz, without answers or mark schemes.
    pub async fn start_quiz(
        &self,
        student_id: &str,
        quiz_id: &str,
    ) -> Result<Vec<PublicQuestion>, AppError> {
        let quiz = self.load_quiz(student_id, quiz_id).await?;
        Ok(quiz.questions.iter().map(PublicQuestion::from).collect())
    }

    /// Grades a submission, then records the attempt together with the
    /// mastery update. A failed update leaves no attempt behind.
    ///
    /// Grading finishes before any progress lock is taken.
    pub async fn submit_quiz(
        &self,
        student_id: &str,
        quiz_id: &str,
        answers: &[SubmittedAnswer],
    ) -> Result<SubmitQuizResponse, AppError> {
        tracing::info!("Submitting quiz: {}", quiz_id);

        let quiz = self.load_quiz(student_id, quiz_id).await?;
        let attempt = self.grader.grade_attempt(student_id, &quiz, answers).await?;
        if attempt.is_degraded() {
            tracing::warn!("Attempt {} graded with fallback marks", attempt.id);
        }

        let progress = self.tracker.record_quiz_attempt(student_id, &attempt).await?;
        let mastery_level = progress
            .subtopic_progress
            .get(&attempt.subtopic_id)
            .map(|sp| sp.mastery_level);

        let next_action = if attempt.score.trigger_tutor {
            "tutor"
        } else {
            "continue"
        };

        Ok(SubmitQuizResponse {
            attempt,
            mastery_level,
            next_action,
        })
    }

    pub async fn complete_lesson(
        &self,
        student_id: &str,
        lesson_id: &str,
        study_time_minutes: u32,
    ) -> Result<Progress, AppError> {
        self.tracker
            .record_lesson_completion(student_id, lesson_id, study_time_minutes)
            .await
    }

    /// Called when a lesson plan is approved. The flag is `false` when
    /// tracking had already started.
    pub async fn initialize_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<(Progress, bool), AppError> {
        self.tracker
            .initialize_progress(student_id, lesson_plan_id)
            .await
    }

    pub async fn get_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Progress, AppError> {
        self.tracker.get_progress(student_id, lesson_plan_id).await
    }

    pub async fn get_dashboard(&self, student_id: &str) -> Result<DashboardResponse, AppError> {
        let (summary, plans) = self.load_summary(student_id).await?;

        // Plans whose metadata is gone cannot be named in a recommendation.
        let known: Vec<_> = summary
            .lesson_plans
            .iter()
            .zip(&plans)
            .filter(|(_, plan)| plan.is_some())
            .map(|(s, _)| s.clone())
            .collect();
        let recommendations = recommendation::recommend(&known, summary.overall_average_score);

        Ok(DashboardResponse {
            summary,
            recommendations,
        })
    }

    pub async fn get_recommendations(&self, student_id: &str) -> Result<Vec<String>, AppError> {
        Ok(self.get_dashboard(student_id).await?.recommendations)
    }

    async fn load_quiz(&self, student_id: &str, quiz_id: &str) -> Result<Quiz, AppError> {
        self.store
            .load_quiz(student_id, quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
    }

    async fn load_summary(
        &self,
        student_id: &str,
    ) -> Result<(ProgressSummary, Vec<Option<LessonPlan>>), AppError> {
        let progress = self.store.list_progress(student_id).await?;

        let mut plans = Vec::with_capacity(progress.len());
        for p in &progress {
            let plan = self
                .store
                .load_lesson_plan(student_id, &p.lesson_plan_id)
                .await?;
            if plan.is_none() {
                tracing::warn!("Progress references missing lesson plan {}", p.lesson_plan_id);
            }
            plans.push(plan);
        }

        Ok((recommendation::summarize(&progress, &plans), plans))
    }
}
