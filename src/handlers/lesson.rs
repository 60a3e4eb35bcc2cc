// src/handlers/lesson.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError, models::dashboard::CompleteLessonRequest, services::Platform,
    utils::jwt::Claims,
};

/// Marks a lesson complete and adds the study time to the plan's total.
pub async fn complete_lesson(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
    Path(lesson_id): Path<String>,
    Json(req): Json<CompleteLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let progress = platform
        .complete_lesson(claims.student_id(), &lesson_id, req.study_time_minutes)
        .await?;

    Ok(Json(json!({
        "lessonCompleted": true,
        "nextAction": "quiz",
        "progress": {
            "percentComplete": progress.overall_progress.percent_complete,
            "totalStudyTime": progress.overall_progress.total_study_time,
        }
    })))
}
