// src/services/grader.rs

use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    config::{
        MAX_WEAK_CONCEPTS, TUTOR_TRIGGER_PERCENTAGE, TUTOR_TRIGGER_WEAK_COUNT,
        WEAK_CONCEPT_CHARS, WEAK_RESPONSE_RATIO,
    },
    error::AppError,
    generator::{ContentGenerator, FreeTextGradeRequest},
    models::{
        attempt::{AttemptScore, GradedAttempt, QuizAttemptResponse, SubmittedAnswer},
        question::{Question, Quiz},
    },
};

pub const GRADING_FALLBACK_FEEDBACK: &str = "Unable to grade answer automatically.";

/// Merges deterministic and AI-assisted marking into one attempt.
pub struct AttemptGrader {
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

/// Strict string matching, same as the deterministic grader has always done.
fn grade_multiple_choice(question: &Question, user_answer: &str) -> QuizAttemptResponse {
    let max_marks = question.max_marks();
    let is_correct = question.correct_answer.as_deref() == Some(user_answer);

    QuizAttemptResponse {
        question_id: question.id.clone(),
        user_answer: user_answer.to_string(),
        marks_awarded: if is_correct { max_marks } else { 0.0 },
        max_marks,
        is_correct: Some(is_correct),
        feedback: if is_correct {
            "Correct!".to_string()
        } else {
            format!(
                "The correct answer is {}",
                question.correct_answer.as_deref().unwrap_or_default()
            )
        },
        ai_generated_answer: None,
        grading_degraded: false,
    }
}

/// Clamps generator marks into `[0, max]`; NaN becomes 0.
fn clamp_marks(marks: f64, max_marks: f64) -> f64 {
    if marks.is_nan() {
        return 0.0;
    }
    marks.clamp(0.0, max_marks)
}

fn is_weak(response: &QuizAttemptResponse) -> bool {
    response.is_correct == Some(false)
        || response.marks_awarded < response.max_marks * WEAK_RESPONSE_RATIO
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Computes totals and tutoring signals for responses in quiz question order.
pub fn summarize(responses: &[QuizAttemptResponse], questions: &[Question]) -> AttemptScore {
    let marks_awarded: f64 = responses.iter().map(|r| r.marks_awarded).sum();
    let max_marks: f64 = responses.iter().map(|r| r.max_marks).sum();
    let percentage = if max_marks > 0.0 {
        marks_awarded / max_marks * 100.0
    } else {
        0.0
    };

    let correct_count = responses
        .iter()
        .filter(|r| r.is_correct == Some(true))
        .count() as u32;

    let prompts: HashMap<&str, &str> = questions
        .iter()
        .map(|q| (q.id.as_str(), q.prompt.as_str()))
        .collect();

    let weak: Vec<&QuizAttemptResponse> = responses.iter().filter(|r| is_weak(r)).collect();

    let weak_concepts = weak
        .iter()
        .filter_map(|r| prompts.get(r.question_id.as_str()))
        .take(MAX_WEAK_CONCEPTS)
        .map(|prompt| truncate_chars(prompt, WEAK_CONCEPT_CHARS))
        .collect();

    AttemptScore {
        correct_count,
        total_questions: responses.len() as u32,
        percentage,
        marks_awarded,
        max_marks,
        trigger_tutor: percentage < TUTOR_TRIGGER_PERCENTAGE
            || weak.len() >= TUTOR_TRIGGER_WEAK_COUNT,
        weak_concepts,
    }
}

impl AttemptGrader {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Grades one free-text answer. Generator failures and timeouts degrade
    /// to a zero-mark response instead of failing the submission.
    async fn grade_free_text(&self, question: &Question, user_answer: &str) -> QuizAttemptResponse {
        let max_marks = question.max_marks();
        let request = FreeTextGradeRequest {
            question: &question.prompt,
            mark_scheme: question.mark_scheme(),
            max_marks,
            student_answer: user_answer,
        };

        let outcome = tokio::time::timeout(self.timeout, self.generator.grade_free_text(request))
            .await
            .map_err(|_| AppError::Upstream(format!("Grading timed out after {:?}", self.timeout)))
            .and_then(|graded| graded);

        match outcome {
            Ok(grade) => QuizAttemptResponse {
                question_id: question.id.clone(),
                user_answer: user_answer.to_string(),
                marks_awarded: clamp_marks(grade.marks_awarded, max_marks),
                max_marks,
                is_correct: None,
                feedback: grade.feedback,
                ai_generated_answer: grade.generated_answer,
                grading_degraded: false,
            },
            Err(e) => {
                tracing::warn!("Falling back to zero marks for question {}: {}", question.id, e);
                QuizAttemptResponse {
                    question_id: question.id.clone(),
                    user_answer: user_answer.to_string(),
                    marks_awarded: 0.0,
                    max_marks,
                    is_correct: None,
                    feedback: GRADING_FALLBACK_FEEDBACK.to_string(),
                    ai_generated_answer: None,
                    grading_degraded: true,
                }
            }
        }
    }

    /// Grades a submission against its quiz.
    ///
    /// * Rejects quizzes with non-positive max marks before grading anything.
    /// * Skips answers to unknown question ids.
    /// * Orders responses by the quiz's question order.
    pub async fn grade_attempt(
        &self,
        student_id: &str,
        quiz: &Quiz,
        answers: &[SubmittedAnswer],
    ) -> Result<GradedAttempt, AppError> {
        for question in &quiz.questions {
            question.validate_marks()?;
        }

        let index: HashMap<&str, (usize, &Question)> = quiz
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| (q.id.as_str(), (i, q)))
            .collect();

        let mut graded: Vec<(usize, QuizAttemptResponse)> = Vec::with_capacity(answers.len());
        for answer in answers {
            let Some(&(position, question)) = index.get(answer.question_id.as_str()) else {
                tracing::debug!("Skipping answer to unknown question {}", answer.question_id);
                continue;
            };

            let response = if question.question_type.is_free_text() {
                self.grade_free_text(question, &answer.user_answer).await
            } else {
                grade_multiple_choice(question, &answer.user_answer)
            };
            graded.push((position, response));
        }

        // Stable, so repeated answers to one question keep submission order.
        graded.sort_by_key(|(position, _)| *position);
        let responses: Vec<QuizAttemptResponse> = graded.into_iter().map(|(_, r)| r).collect();

        let score = summarize(&responses, &quiz.questions);

        let attempt = GradedAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            quiz_id: quiz.id.clone(),
            lesson_id: quiz.lesson_id.clone(),
            subtopic_id: quiz.subtopic_id.clone(),
            responses,
            score,
            completed_at: chrono::Utc::now(),
        };

        tracing::info!(
            "Graded attempt {} for quiz {}: {:.1}% ({}/{} marks, tutor: {})",
            attempt.id,
            quiz.id,
            attempt.score.percentage,
            attempt.score.marks_awarded,
            attempt.score.max_marks,
            attempt.score.trigger_tutor
        );

        Ok(attempt)
    }
}
