// src/services/mastery.rs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    error::{AppError, PROGRESS_RETRY_MESSAGE},
    models::{
        attempt::GradedAttempt,
        progress::{MasteryLevel, Progress, SubtopicProgress, SubtopicStatus},
    },
    store::Store,
};

/// Coarse competence classification. The mastered check must come first.
pub fn mastery_level(best_score: f64, avg_score: f64, attempts: u32) -> MasteryLevel {
    if attempts == 0 {
        MasteryLevel::NotStarted
    } else if best_score >= 80.0 && avg_score >= 70.0 {
        MasteryLevel::Mastered
    } else if best_score >= 60.0 || avg_score >= 50.0 {
        MasteryLevel::Intermediate
    } else {
        MasteryLevel::Beginner
    }
}

impl SubtopicProgress {
    /// Marks the lesson done. Never moves a subtopic to `Completed` and never
    /// moves a completed one backwards.
    pub fn apply_lesson_completion(&mut self) {
        self.lesson_completed = true;
        if self.status == SubtopicStatus::NotStarted {
            self.status = SubtopicStatus::InProgress;
        }
    }

    /// Folds one attempt into the running statistics.
    pub fn apply_attempt(&mut self, attempt: &GradedAttempt) {
        let percentage = attempt.score.percentage;
        let previous = self.quiz_attempts as f64;

        self.quiz_attempts += 1;
        self.best_score = self.best_score.max(percentage);
        self.average_score =
            (self.average_score * previous + percentage) / self.quiz_attempts as f64;

        if !attempt.score.weak_concepts.is_empty() {
            self.weak_concepts = attempt.score.weak_concepts.clone();
        }

        self.mastery_level = mastery_level(self.best_score, self.average_score, self.quiz_attempts);
        self.status = if self.mastery_level == MasteryLevel::Mastered {
            SubtopicStatus::Completed
        } else {
            SubtopicStatus::InProgress
        };
        self.last_attempt_at = Some(attempt.completed_at);
    }
}

impl Progress {
    /// Re-derives the plan summary from the subtopic entries.
    pub fn recompute_overall(&mut self) {
        let total = self.subtopic_progress.len() as u32;
        let completed = self
            .subtopic_progress
            .values()
            .filter(|sp| sp.status == SubtopicStatus::Completed)
            .count() as u32;

        let attempted: Vec<f64> = self
            .subtopic_progress
            .values()
            .filter(|sp| sp.quiz_attempts > 0)
            .map(|sp| sp.average_score)
            .collect();

        let overall = &mut self.overall_progress;
        overall.total_subtopics = total;
        overall.completed_subtopics = completed;
        overall.percent_complete = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        overall.average_score = if attempted.is_empty() {
            0.0
        } else {
            attempted.iter().sum::<f64>() / attempted.len() as f64
        };
    }

    fn subtopic_mut(&mut self, subtopic_id: &str) -> Result<&mut SubtopicProgress, AppError> {
        let plan_id = self.lesson_plan_id.clone();
        self.subtopic_progress.get_mut(subtopic_id).ok_or_else(|| {
            AppError::NotFound(format!(
                "Subtopic {} not found in lesson plan {}",
                subtopic_id, plan_id
            ))
        })
    }
}

type ProgressKey = (String, String);

/// Owns every mutation of `Progress`.
///
/// Writes for one (student, plan) are serialized in-process by a keyed async
/// mutex and checked against the stored version, so a writer in another
/// process forces a reload-and-retry instead of a lost update.
pub struct MasteryTracker {
    store: Arc<dyn Store>,
    max_retries: u32,
    locks: Mutex<HashMap<ProgressKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl MasteryTracker {
    pub fn new(store: Arc<dyn Store>, max_retries: u32) -> Self {
        Self {
            store,
            max_retries,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: ProgressKey) -> KeyLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks.entry(key.clone()).or_default().clone();
        KeyLock {
            tracker: self,
            key,
            lock,
        }
    }

    /// Creates the zeroed record for a plan if it does not exist yet.
    ///
    /// Returns the record and whether this call created it.
    pub async fn initialize_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<(Progress, bool), AppError> {
        if let Some(existing) = self.store.load_progress(student_id, lesson_plan_id).await? {
            return Ok((existing, false));
        }

        tracing::info!("Initializing progress for lesson plan: {}", lesson_plan_id);
        let progress = self
            .update(student_id, lesson_plan_id, None, |_| Ok(()))
            .await?;
        Ok((progress, true))
    }

    pub async fn get_progress(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Progress, AppError> {
        self.store
            .load_progress(student_id, lesson_plan_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("No progress for lesson plan {}", lesson_plan_id))
            })
    }

    /// Records a finished lesson.
    ///
    /// Study time accumulates on every call, while the subtopic itself is
    /// only ever marked once.
    pub async fn record_lesson_completion(
        &self,
        student_id: &str,
        lesson_id: &str,
        study_time_minutes: u32,
    ) -> Result<Progress, AppError> {
        tracing::info!("Updating lesson completion for: {}", lesson_id);

        let parent = self
            .store
            .resolve_lesson_parent(student_id, lesson_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lesson {} not found", lesson_id)))?;

        self.update(student_id, &parent.lesson_plan_id, None, |progress| {
            progress
                .subtopic_mut(&parent.subtopic_id)?
                .apply_lesson_completion();
            progress.overall_progress.total_study_time += u64::from(study_time_minutes);
            Ok(())
        })
        .await
    }

    /// Folds a graded attempt into the subtopic's running statistics and
    /// stores the attempt with the same write.
    pub async fn record_quiz_attempt(
        &self,
        student_id: &str,
        attempt: &GradedAttempt,
    ) -> Result<Progress, AppError> {
        tracing::info!("Updating quiz completion for attempt: {}", attempt.id);

        let lesson_plan_id = self
            .store
            .resolve_attempt_parent(attempt)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Lesson {} not found", attempt.lesson_id))
            })?;

        self.update(student_id, &lesson_plan_id, Some(attempt), |progress| {
            progress
                .subtopic_mut(&attempt.subtopic_id)?
                .apply_attempt(attempt);
            Ok(())
        })
        .await
    }

    /// Runs one read-modify-write of a progress record under the key lock.
    async fn update<F>(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
        attempt: Option<&GradedAttempt>,
        apply: F,
    ) -> Result<Progress, AppError>
    where
        F: Fn(&mut Progress) -> Result<(), AppError>,
    {
        let key_lock = self.key_lock((student_id.to_string(), lesson_plan_id.to_string()));
        let _guard = key_lock.lock.lock().await;
        self.update_with_retry(student_id, lesson_plan_id, attempt, &apply)
            .await
    }

    async fn update_with_retry<F>(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
        attempt: Option<&GradedAttempt>,
        apply: &F,
    ) -> Result<Progress, AppError>
    where
        F: Fn(&mut Progress) -> Result<(), AppError>,
    {
        let mut retries = 0;
        loop {
            let mut progress = self.load_or_init(student_id, lesson_plan_id).await?;
            apply(&mut progress)?;
            progress.recompute_overall();
            progress.updated_at = chrono::Utc::now();

            let saved = match attempt {
                Some(attempt) => {
                    self.store
                        .save_progress_with_attempt(&progress, attempt)
                        .await
                }
                None => self.store.save_progress(&progress).await,
            };

            match saved {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_conflict() && retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        "Progress write conflict for plan {} (retry {}/{})",
                        lesson_plan_id,
                        retries,
                        self.max_retries
                    );
                }
                Err(e) if e.is_conflict() => {
                    tracing::error!(
                        "Giving up on progress for plan {} after {} retries: {}",
                        lesson_plan_id,
                        self.max_retries,
                        e
                    );
                    return Err(AppError::Conflict(PROGRESS_RETRY_MESSAGE.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load_or_init(
        &self,
        student_id: &str,
        lesson_plan_id: &str,
    ) -> Result<Progress, AppError> {
        if let Some(progress) = self.store.load_progress(student_id, lesson_plan_id).await? {
            return Ok(progress);
        }

        let plan = self
            .store
            .load_lesson_plan(student_id, lesson_plan_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Lesson plan {} not found", lesson_plan_id))
            })?;

        Ok(Progress::for_plan(student_id, &plan))
    }
}

/// Handle on one key's mutex. Dropping the last handle removes the entry,
/// including when the owning future is cancelled mid-update.
struct KeyLock<'a> {
    tracker: &'a MasteryTracker,
    key: ProgressKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.tracker.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this handle hold it: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attempt::AttemptScore;

    fn attempt_with(percentage: f64, weak: &[&str]) -> GradedAttempt {
        GradedAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: "alice".to_string(),
            quiz_id: "quiz-1".to_string(),
            lesson_id: "lesson-1".to_string(),
            subtopic_id: "sub-1".to_string(),
            responses: vec![],
            score: AttemptScore {
                percentage,
                weak_concepts: weak.iter().map(|s| s.to_string()).collect(),
                ..AttemptScore::default()
            },
            completed_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_mastery_level_boundaries() {
        assert_eq!(mastery_level(100.0, 100.0, 0), MasteryLevel::NotStarted);
        assert_eq!(mastery_level(80.0, 70.0, 2), MasteryLevel::Mastered);
        assert_eq!(mastery_level(79.9, 70.0, 2), MasteryLevel::Intermediate);
        assert_eq!(mastery_level(60.0, 10.0, 1), MasteryLevel::Intermediate);
        assert_eq!(mastery_level(40.0, 50.0, 3), MasteryLevel::Intermediate);
        assert_eq!(mastery_level(59.9, 49.9, 1), MasteryLevel::Beginner);
    }

    #[test]
    fn test_mastery_level_monotone_in_best_score() {
        for avg in [0.0, 45.0, 50.0, 69.9, 70.0, 95.0] {
            let mut previous = MasteryLevel::NotStarted;
            for step in 0..=100 {
                let level = mastery_level(step as f64, avg, 1);
                assert!(level >= previous, "best={} avg={}", step, avg);
                if level == MasteryLevel::Mastered {
                    assert!(step as f64 >= 80.0 && avg >= 70.0);
                }
                previous = level;
            }
        }
    }

    #[test]
    fn test_attempts_fifty_then_ninety_master_the_subtopic() {
        let mut sp = SubtopicProgress::default();
        sp.apply_attempt(&attempt_with(50.0, &[]));
        sp.apply_attempt(&attempt_with(90.0, &[]));

        assert_eq!(sp.quiz_attempts, 2);
        assert_eq!(sp.best_score, 90.0);
        assert!((sp.average_score - 70.0).abs() < 1e-9);
        assert_eq!(sp.mastery_level, MasteryLevel::Mastered);
        assert_eq!(sp.status, SubtopicStatus::Completed);
    }

    #[test]
    fn test_attempts_fifty_then_fifty_five_are_intermediate() {
        let mut sp = SubtopicProgress::default();
        sp.apply_attempt(&attempt_with(50.0, &[]));
        sp.apply_attempt(&attempt_with(55.0, &[]));

        assert_eq!(sp.best_score, 55.0);
        assert!((sp.average_score - 52.5).abs() < 1e-9);
        assert_eq!(sp.mastery_level, MasteryLevel::Intermediate);
        assert_eq!(sp.status, SubtopicStatus::InProgress);
    }

    #[test]
    fn test_running_mean_matches_full_recompute() {
        let scores = [12.5, 100.0, 33.3, 67.0, 0.0, 88.8, 45.5, 71.2, 99.9, 5.0];
        let mut sp = SubtopicProgress::default();
        for (i, pct) in scores.iter().enumerate() {
            sp.apply_attempt(&attempt_with(*pct, &[]));
            let mean = scores[..=i].iter().sum::<f64>() / (i + 1) as f64;
            assert!((sp.average_score - mean).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_weak_concepts_keep_previous_list() {
        let mut sp = SubtopicProgress::default();
        sp.apply_attempt(&attempt_with(30.0, &["Osmosis"]));
        sp.apply_attempt(&attempt_with(90.0, &[]));
        assert_eq!(sp.weak_concepts, vec!["Osmosis"]);

        sp.apply_attempt(&attempt_with(20.0, &["Diffusion"]));
        assert_eq!(sp.weak_concepts, vec!["Diffusion"]);
    }

    #[test]
    fn test_lesson_completion_never_demotes_or_completes() {
        let mut sp = SubtopicProgress::default();
        sp.apply_lesson_completion();
        assert_eq!(sp.status, SubtopicStatus::InProgress);

        sp.status = SubtopicStatus::Completed;
        sp.apply_lesson_completion();
        assert_eq!(sp.status, SubtopicStatus::Completed);
    }

    #[test]
    fn test_recompute_overall_excludes_unattempted_subtopics() {
        use crate::models::lesson_plan::{LessonPlan, LessonPlanItem};

        let plan = LessonPlan {
            id: "plan-1".to_string(),
            student_id: "alice".to_string(),
            subject: "Biology".to_string(),
            topic: "Cells".to_string(),
            structure: (1..=4)
                .map(|i| LessonPlanItem {
                    subtopic_id: format!("sub-{}", i),
                    title: format!("Part {}", i),
                    order: i,
                })
                .collect(),
        };
        let mut progress = Progress::for_plan("alice", &plan);

        let sub1 = progress.subtopic_progress.get_mut("sub-1").unwrap();
        sub1.apply_attempt(&attempt_with(90.0, &[]));
        let sub2 = progress.subtopic_progress.get_mut("sub-2").unwrap();
        sub2.apply_attempt(&attempt_with(40.0, &[]));
        progress.recompute_overall();

        assert_eq!(progress.overall_progress.completed_subtopics, 1);
        assert_eq!(progress.overall_progress.percent_complete, 25.0);
        assert!((progress.overall_progress.average_score - 65.0).abs() < 1e-9);

        for sp in progress.subtopic_progress.values_mut() {
            sp.status = SubtopicStatus::Completed;
        }
        progress.recompute_overall();
        assert_eq!(progress.overall_progress.percent_complete, 100.0);
    }

    #[test]
    fn test_recompute_overall_with_no_subtopics() {
        use crate::models::lesson_plan::LessonPlan;

        let mut progress = Progress::for_plan(
            "alice",
            &LessonPlan {
                id: "empty".to_string(),
                student_id: "alice".to_string(),
                subject: "Art".to_string(),
                topic: "Colour".to_string(),
                structure: vec![],
            },
        );
        progress.recompute_overall();
        assert_eq!(progress.overall_progress.percent_complete, 0.0);
        assert_eq!(progress.overall_progress.average_score, 0.0);
    }

    #[tokio::test]
    async fn test_cancelled_update_releases_its_key_lock() {
        use crate::{
            models::lesson_plan::{LessonPlan, LessonPlanItem},
            store::MemoryStore,
        };

        let store = Arc::new(MemoryStore::new());
        store
            .insert_lesson_plan(LessonPlan {
                id: "plan-1".to_string(),
                student_id: "alice".to_string(),
                subject: "Biology".to_string(),
                topic: "Cells".to_string(),
                structure: vec![LessonPlanItem {
                    subtopic_id: "sub-1".to_string(),
                    title: "Organelles".to_string(),
                    order: 1,
                }],
            })
            .await;
        let tracker = MasteryTracker::new(store, 3);

        let held = tracker.key_lock(("alice".to_string(), "plan-1".to_string()));
        let guard = held.lock.lock().await;

        // Blocks on the held lock until the timeout drops the future.
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            tracker.initialize_progress("alice", "plan-1"),
        )
        .await;
        assert!(timed_out.is_err());

        drop(guard);
        drop(held);
        assert!(tracker.locks.lock().unwrap().is_empty());

        let (progress, created) = tracker.initialize_progress("alice", "plan-1").await.unwrap();
        assert!(created);
        assert_eq!(progress.version, 1);
        assert!(tracker.locks.lock().unwrap().is_empty());
    }
}
