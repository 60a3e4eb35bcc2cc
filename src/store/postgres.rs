// src/store/postgres.rs

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, prelude::FromRow, types::Json};

use super::Store;
use crate::{
    error::AppError,
    models::{
        attempt::GradedAttempt,
        lesson_plan::{LessonParent, LessonPlan, LessonPlanItem},
        progress::{OverallProgress, Progress, SubtopicProgress},
        question::{Question, Quiz},
    },
};

/// Postgres-backed store. Progress rows carry a `version` column used for
/// conditional writes.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Represents the 'progress' table in the database.
#[derive(FromRow)]
struct ProgressRow {
    student_id: String,
    lesson_plan_id: String,
    subtopic_progress: Json<BTreeMap<String, SubtopicProgress>>,
    overall_progress: Json<OverallProgress>,
    version: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProgressRow> for Progress {
    fn from(row: ProgressRow) -> Self {
        Self {
            student_id: row.student_id,
            lesson_plan_id: row.lesson_plan_id,
            subtopic_progress: row.subtopic_progress.0,
            overall_progress: row.overall_progress.0,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

#[derive(FromRow)]
struct LessonPlanRow {
    id: String,
    student_id: String,
    subject: String,
    topic: String,
    structure: Json<Vec<LessonPlanItem>>,
}

#[derive(FromRow)]
struct QuizRow {
    id: String,
    student_id: String,
    lesson_id: String,
    subtopic_id: String,
    questions: Json<Vec<Question>>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

const PROGRESS_COLUMNS: &str =
    "student_id, lesson_plan_id, subtopic_progress, overall_progress, version, updated_at";

#[async_trait]
impl Store for PgStore {
    async fn load_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Option<Progress>, AppError> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {} FROM progress WHERE student_id = $1 AND lesson_plan_id = $2",
            PROGRESS_COLUMNS
        ))
        .bind(student_id)
        .bind(lesson_plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load progress: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(row.map(Progress::from))
    }

    async fn save_progress(&self, progress: &Progress) -> Result<Progress, AppError> {
        let mut conn = self.pool.acquire().await?;
        let version = write_progress(&mut conn, progress).await?;
        versioned(progress, version)
    }

    async fn save_progress_with_attempt(
        &self,
        progress: &Progress,
        attempt: &GradedAttempt,
    ) -> Result<Progress, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to begin transaction: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        // Dropping `tx` without commit rolls back.
        let saved = versioned(progress, write_progress(&mut tx, progress).await?)?;
        insert_attempt(&mut tx, attempt).await?;

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit quiz attempt: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(saved)
    }

    async fn list_progress(&self, student_id: &str) -> Result<Vec<Progress>, AppError> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "SELECT {} FROM progress WHERE student_id = $1 ORDER BY lesson_plan_id",
            PROGRESS_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list progress: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(rows.into_iter().map(Progress::from).collect())
    }

    async fn load_lesson_plan(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Option<LessonPlan>, AppError> {
        let row = sqlx::query_as::<_, LessonPlanRow>(
            r#"
            SELECT id, student_id, subject, topic, structure
            FROM lesson_plans
            WHERE student_id = $1 AND id = $2
            "#,
        )
        .bind(student_id)
        .bind(lesson_plan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let mut structure = r.structure.0;
            structure.sort_by_key(|item| item.order);
            LessonPlan {
                id: r.id,
                student_id: r.student_id,
                subject: r.subject,
                topic: r.topic,
                structure,
            }
        }))
    }

    async fn resolve_lesson_parent(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonParent>, AppError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT lesson_plan_id, subtopic_id FROM lessons WHERE student_id = $1 AND id = $2",
        )
        .bind(student_id)
        .bind(lesson_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(lesson_plan_id, subtopic_id)| LessonParent {
            lesson_plan_id,
            subtopic_id,
        }))
    }

    async fn load_quiz(&self, student_id: &str, quiz_id: &str) -> Result<Option<Quiz>, AppError> {
        let row = sqlx::query_as::<_, QuizRow>(
            r#"
            SELECT id, student_id, lesson_id, subtopic_id, questions, created_at
            FROM quizzes
            WHERE student_id = $1 AND id = $2
            "#,
        )
        .bind(student_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Quiz {
            id: r.id,
            student_id: r.student_id,
            lesson_id: r.lesson_id,
            subtopic_id: r.subtopic_id,
            questions: r.questions.0,
            created_at: r.created_at,
        }))
    }
}

/// Version-conditional upsert. `None` means another writer got there first.
async fn write_progress(
    conn: &mut PgConnection,
    progress: &Progress,
) -> Result<Option<i64>, sqlx::Error> {
    if progress.version == 0 {
        // First write: only succeeds if nobody created the row meanwhile.
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO progress (student_id, lesson_plan_id, subtopic_progress, overall_progress, version, updated_at)
            VALUES ($1, $2, $3, $4, 1, $5)
            ON CONFLICT (student_id, lesson_plan_id) DO NOTHING
            RETURNING version
            "#,
        )
        .bind(&progress.student_id)
        .bind(&progress.lesson_plan_id)
        .bind(Json(&progress.subtopic_progress))
        .bind(Json(&progress.overall_progress))
        .bind(progress.updated_at)
        .fetch_optional(&mut *conn)
        .await
    } else {
        sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE progress
            SET subtopic_progress = $3,
                overall_progress = $4,
                updated_at = $5,
                version = version + 1
            WHERE student_id = $1 AND lesson_plan_id = $2 AND version = $6
            RETURNING version
            "#,
        )
        .bind(&progress.student_id)
        .bind(&progress.lesson_plan_id)
        .bind(Json(&progress.subtopic_progress))
        .bind(Json(&progress.overall_progress))
        .bind(progress.updated_at)
        .bind(progress.version)
        .fetch_optional(&mut *conn)
        .await
    }
}

fn versioned(progress: &Progress, new_version: Option<i64>) -> Result<Progress, AppError> {
    match new_version {
        Some(version) => Ok(Progress {
            version,
            ..progress.clone()
        }),
        None => Err(AppError::Conflict(format!(
            "Progress for plan {} changed since version {}",
            progress.lesson_plan_id, progress.version
        ))),
    }
}

async fn insert_attempt(conn: &mut PgConnection, attempt: &GradedAttempt) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO quiz_attempts (id, student_id, quiz_id, lesson_id, subtopic_id, responses, score, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&attempt.id)
    .bind(&attempt.student_id)
    .bind(&attempt.quiz_id)
    .bind(&attempt.lesson_id)
    .bind(&attempt.subtopic_id)
    .bind(Json(&attempt.responses))
    .bind(Json(&attempt.score))
    .bind(attempt.completed_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
            AppError::Conflict(format!("Attempt {} already recorded", attempt.id))
        } else {
            tracing::error!("Failed to save quiz attempt: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    Ok(())
}
