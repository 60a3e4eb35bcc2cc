// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{health, lesson, progress, quiz},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (quizzes, lessons, lesson plans, dashboard).
/// * Protects every student route with bearer-token authentication.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let quiz_routes = Router::new()
        .route("/{quiz_id}", get(quiz::get_quiz))
        .route("/{quiz_id}/submit", post(quiz::submit_quiz));

    let lesson_routes =
        Router::new().route("/{lesson_id}/complete", post(lesson::complete_lesson));

    let plan_routes = Router::new().route(
        "/{plan_id}/progress",
        get(progress::get_progress).post(progress::initialize_progress),
    );

    let student_routes = Router::new()
        .nest("/quizzes", quiz_routes)
        .nest("/lessons", lesson_routes)
        .nest("/lesson-plans", plan_routes)
        .route("/dashboard", get(progress::get_dashboard))
        .route("/recommendations", get(progress::get_recommendations))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/api", student_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
