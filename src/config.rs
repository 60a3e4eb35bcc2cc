// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Below this percentage an attempt escalates to the tutor.
pub const TUTOR_TRIGGER_PERCENTAGE: f64 = 40.0;

/// Number of weak responses that escalates to the tutor regardless of score.
pub const TUTOR_TRIGGER_WEAK_COUNT: usize = 3;

/// A response scoring under this fraction of its max marks counts as weak.
pub const WEAK_RESPONSE_RATIO: f64 = 0.5;

pub const MAX_WEAK_CONCEPTS: usize = 3;
pub const WEAK_CONCEPT_CHARS: usize = 50;

pub const MAX_RECOMMENDATIONS: usize = 3;

/// Plans averaging below this (but above zero) get a "Review" recommendation.
pub const REVIEW_SCORE_THRESHOLD: f64 = 60.0;

/// Overall average above which a new topic is suggested.
pub const NEW_TOPIC_SCORE_THRESHOLD: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,

    /// OpenAI-compatible endpoint used for free-text grading.
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,

    /// Upper bound on a single free-text grading call.
    pub grading_timeout_secs: u64,

    /// How many times a conflicting progress write is retried.
    pub progress_write_retries: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let llm_base_url = env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());

        let llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());

        let llm_model = env::var("LLM_MODEL")
            .unwrap_or_else(|_| "gpt-4".to_string());

        let grading_timeout_secs = env::var("GRADING_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let progress_write_retries = env::var("PROGRESS_WRITE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            port,
            llm_base_url,
            llm_api_key,
            llm_model,
            grading_timeout_secs,
            progress_write_retries,
        }
    }
}
