// src/models/mod.rs

pub mod attempt;
pub mod dashboard;
pub mod lesson_plan;
pub mod progress;
pub mod question;
