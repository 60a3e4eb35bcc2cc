// src/handlers/progress.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{error::AppError, services::Platform, utils::jwt::Claims};

/// Initializes progress tracking for an approved lesson plan.
/// Returns the existing record with 200 if tracking already started.
pub async fn initialize_progress(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (progress, created) = platform
        .initialize_progress(claims.student_id(), &plan_id)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(progress)))
}

pub async fn get_progress(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let progress = platform.get_progress(claims.student_id(), &plan_id).await?;
    Ok(Json(progress))
}

/// Totals across all plans plus recommendations.
pub async fn get_dashboard(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let dashboard = platform.get_dashboard(claims.student_id()).await?;
    Ok(Json(dashboard))
}

pub async fn get_recommendations(
    State(platform): State<Arc<Platform>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let recommendations = platform.get_recommendations(claims.student_id()).await?;
    Ok(Json(recommendations))
}
