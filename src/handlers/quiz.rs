// src/handlers/quiz.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError, models::attempt::SubmitQuizRequest, services::Platform, utils::jwt::Claims,
};

/// Returns the quiz questions without answers or mark schemes.
pub async fn get_quiz(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let questions = platform.start_quiz(claims.student_id(), &quiz_id).await?;
    Ok(Json(questions))
}

/// Submits a student's quiz answers.
///
/// * Grades multiple choice locally and free text through the generator.
/// * Persists the attempt in the same write as the student's progress.
/// * Returns the attempt, the updated mastery level and the next action.
pub async fn submit_quiz(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<String>,
    Json(req): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = req.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let result = platform
        .submit_quiz(claims.student_id(), &quiz_id, &req.responses)
        .await?;

    Ok(Json(result))
}
