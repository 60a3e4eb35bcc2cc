// src/services/recommendation.rs

use crate::{
    config::{MAX_RECOMMENDATIONS, NEW_TOPIC_SCORE_THRESHOLD, REVIEW_SCORE_THRESHOLD},
    models::{
        dashboard::{PlanSummary, ProgressSummary},
        lesson_plan::LessonPlan,
        progress::Progress,
    },
};

pub const NEW_TOPIC_MESSAGE: &str = "Start a new topic - you're doing great!";

/// Mean of the given plan averages, ignoring plans with no attempts.
fn overall_average(averages: impl Iterator<Item = f64>) -> f64 {
    let scored: Vec<f64> = averages.filter(|avg| *avg > 0.0).collect();
    if scored.is_empty() {
        0.0
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    }
}

/// Builds dashboard totals. `plans[i]` is the metadata of `progress[i]`, if found.
pub fn summarize(progress: &[Progress], plans: &[Option<LessonPlan>]) -> ProgressSummary {
    let lesson_plans: Vec<PlanSummary> = progress
        .iter()
        .zip(plans)
        .map(|(p, plan)| PlanSummary {
            lesson_plan_id: p.lesson_plan_id.clone(),
            subject: plan
                .as_ref()
                .map_or_else(|| "Unknown".to_string(), |pl| pl.subject.clone()),
            topic: plan
                .as_ref()
                .map_or_else(|| "Unknown".to_string(), |pl| pl.topic.clone()),
            percent_complete: p.overall_progress.percent_complete,
            average_score: p.overall_progress.average_score,
            total_subtopics: p.overall_progress.total_subtopics,
            completed_subtopics: p.overall_progress.completed_subtopics,
        })
        .collect();

    let total_subtopics: u32 = lesson_plans.iter().map(|s| s.total_subtopics).sum();
    let completed_subtopics: u32 = lesson_plans.iter().map(|s| s.completed_subtopics).sum();

    ProgressSummary {
        total_subtopics,
        completed_subtopics,
        overall_percent_complete: if total_subtopics > 0 {
            completed_subtopics as f64 / total_subtopics as f64 * 100.0
        } else {
            0.0
        },
        total_study_time: progress
            .iter()
            .map(|p| p.overall_progress.total_study_time)
            .sum(),
        overall_average_score: overall_average(lesson_plans.iter().map(|s| s.average_score)),
        lesson_plans,
    }
}

/// Ranked next actions: unfinished plans, then weak plans, then a nudge to
/// start something new. At most `MAX_RECOMMENDATIONS`, in plan order.
pub fn recommend(plans: &[PlanSummary], overall_average_score: f64) -> Vec<String> {
    let continue_plans = plans
        .iter()
        .filter(|p| p.percent_complete < 100.0)
        .map(|p| {
            format!(
                "Continue {} - {} ({:.0}% complete)",
                p.subject, p.topic, p.percent_complete
            )
        });

    // Zero means no attempts yet, not a low score.
    let review_plans = plans
        .iter()
        .filter(|p| p.average_score > 0.0 && p.average_score < REVIEW_SCORE_THRESHOLD)
        .map(|p| {
            format!(
                "Review {} - {} (average score: {:.0}%)",
                p.subject, p.topic, p.average_score
            )
        });

    let new_topic = (overall_average_score > NEW_TOPIC_SCORE_THRESHOLD)
        .then(|| NEW_TOPIC_MESSAGE.to_string());

    continue_plans
        .chain(review_plans)
        .chain(new_topic)
        .take(MAX_RECOMMENDATIONS)
        .collect()
}
