// src/services/mod.rs

pub mod grader;
pub mod mastery;
pub mod platform;
pub mod recommendation;

pub use grader::AttemptGrader;
pub use mastery::MasteryTracker;
pub use platform::Platform;
