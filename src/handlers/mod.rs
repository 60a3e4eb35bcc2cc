// src/handlers/mod.rs

pub mod health;
pub mod lesson;
pub mod progress;
pub mod quiz;
