// tests/progress_tests.rs

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use learning_core::{
    error::{AppError, PROGRESS_RETRY_MESSAGE},
    generator::{ContentGenerator, FreeTextGrade, FreeTextGradeRequest},
    models::{
        attempt::{AttemptScore, GradedAttempt, SubmittedAnswer},
        lesson_plan::{LessonParent, LessonPlan, LessonPlanItem},
        progress::{MasteryLevel, Progress, SubtopicStatus},
        question::{Question, QuestionType, Quiz},
    },
    services::{AttemptGrader, MasteryTracker, Platform},
    store::{MemoryStore, Store},
};

const STUDENT: &str = "alice";

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_lesson_plan(LessonPlan {
            id: "plan-1".to_string(),
            student_id: STUDENT.to_string(),
            subject: "Chemistry".to_string(),
            topic: "Bonding".to_string(),
            structure: vec![
                LessonPlanItem {
                    subtopic_id: "ionic".to_string(),
                    title: "Ionic bonding".to_string(),
                    order: 1,
                },
                LessonPlanItem {
                    subtopic_id: "covalent".to_string(),
                    title: "Covalent bonding".to_string(),
                    order: 2,
                },
            ],
        })
        .await;
    for subtopic in ["ionic", "covalent"] {
        store
            .insert_lesson(
                STUDENT,
                &format!("lesson-{}", subtopic),
                LessonParent {
                    lesson_plan_id: "plan-1".to_string(),
                    subtopic_id: subtopic.to_string(),
                },
            )
            .await;
    }
    store
}

fn attempt(subtopic: &str, percentage: f64) -> GradedAttempt {
    GradedAttempt {
        id: uuid::Uuid::new_v4().to_string(),
        student_id: STUDENT.to_string(),
        quiz_id: format!("quiz-{}", subtopic),
        lesson_id: format!("lesson-{}", subtopic),
        subtopic_id: subtopic.to_string(),
        responses: vec![],
        score: AttemptScore {
            percentage,
            ..AttemptScore::default()
        },
        completed_at: chrono::Utc::now(),
    }
}

/// Wraps a store and rejects the first `conflicts` progress writes.
struct ContendedStore {
    inner: Arc<MemoryStore>,
    conflicts: AtomicU32,
    saves: AtomicU32,
}

impl ContendedStore {
    fn new(inner: Arc<MemoryStore>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
            saves: AtomicU32::new(0),
        }
    }

    fn contend(&self) -> Result<(), AppError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Conflict("simulated concurrent writer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for ContendedStore {
    async fn load_progress(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Option<Progress>, AppError> {
        self.inner.load_progress(student_id, plan_id).await
    }

    async fn save_progress(&self, progress: &Progress) -> Result<Progress, AppError> {
        self.contend()?;
        self.inner.save_progress(progress).await
    }

    async fn save_progress_with_attempt(
        &self,
        progress: &Progress,
        attempt: &GradedAttempt,
    ) -> Result<Progress, AppError> {
        self.contend()?;
        self.inner.save_progress_with_attempt(progress, attempt).await
    }

    async fn list_progress(&self, student_id: &str) -> Result<Vec<Progress>, AppError> {
        self.inner.list_progress(student_id).await
    }

    async fn load_lesson_plan(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Option<LessonPlan>, AppError> {
        self.inner.load_lesson_plan(student_id, plan_id).await
    }

    async fn resolve_lesson_parent(
        &self,
        student_id: &str,
        lesson_id: &str,
    ) -> Result<Option<LessonParent>, AppError> {
        self.inner.resolve_lesson_parent(student_id, lesson_id).await
    }

    async fn load_quiz(&self, student_id: &str, quiz_id: &str) -> Result<Option<Quiz>, AppError> {
        self.inner.load_quiz(student_id, quiz_id).await
    }
}

/// Multiple choice only, so grading never reaches the generator.
struct UnusedGenerator;

#[async_trait]
impl ContentGenerator for UnusedGenerator {
    async fn grade_free_text(
        &self,
        _request: FreeTextGradeRequest<'_>,
    ) -> Result<FreeTextGrade, AppError> {
        Err(AppError::Upstream("generator not available".to_string()))
    }
}

async fn insert_quiz(store: &MemoryStore, quiz_id: &str, lesson_id: &str, subtopic: &str) {
    store
        .insert_quiz(Quiz {
            id: quiz_id.to_string(),
            student_id: STUDENT.to_string(),
            lesson_id: lesson_id.to_string(),
            subtopic_id: subtopic.to_string(),
            questions: vec![Question {
                id: "q1".to_string(),
                question_type: QuestionType::MultipleChoice,
                prompt: "Which bond shares electrons?".to_string(),
                options: Some(vec!["Ionic".to_string(), "Covalent".to_string()]),
                correct_answer: Some("Covalent".to_string()),
                mark_scheme: None,
                max_marks: None,
                difficulty: None,
            }],
            created_at: None,
        })
        .await;
}

fn platform_over(store: Arc<dyn Store>, max_retries: u32) -> Platform {
    let grader = AttemptGrader::new(Arc::new(UnusedGenerator), Duration::from_secs(1));
    let tracker = MasteryTracker::new(store.clone(), max_retries);
    Platform::new(store, grader, tracker)
}

fn answer(user_answer: &str) -> Vec<SubmittedAnswer> {
    vec![SubmittedAnswer {
        question_id: "q1".to_string(),
        user_answer: user_answer.to_string(),
    }]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attempts_keep_a_true_running_mean() {
    let store = seeded_store().await;
    let tracker = Arc::new(MasteryTracker::new(store.clone(), 3));

    let scores: Vec<f64> = (0..40).map(|i| (i * 37 % 101) as f64).collect();

    let mut handles = Vec::new();
    for pct in scores.clone() {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            tracker
                .record_quiz_attempt(STUDENT, &attempt("ionic", pct))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let progress = store.load_progress(STUDENT, "plan-1").await.unwrap().unwrap();
    let ionic = &progress.subtopic_progress["ionic"];
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let best = scores.iter().cloned().fold(0.0, f64::max);

    assert_eq!(ionic.quiz_attempts, 40);
    assert!((ionic.average_score - mean).abs() < 1e-6);
    assert_eq!(ionic.best_score, best);
    assert_eq!(progress.version, 40);
}

#[tokio::test]
async fn conflicts_are_retried_until_the_write_lands() {
    let store = Arc::new(ContendedStore::new(seeded_store().await, 2));
    let tracker = MasteryTracker::new(store.clone(), 3);

    let progress = tracker
        .record_quiz_attempt(STUDENT, &attempt("ionic", 85.0))
        .await
        .unwrap();

    assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    let ionic = &progress.subtopic_progress["ionic"];
    assert_eq!(ionic.quiz_attempts, 1);
    assert_eq!(ionic.mastery_level, MasteryLevel::Mastered);
    assert_eq!(ionic.status, SubtopicStatus::Completed);
    assert_eq!(progress.overall_progress.completed_subtopics, 1);
    assert_eq!(progress.overall_progress.percent_complete, 50.0);
}

#[tokio::test]
async fn exhausted_retries_surface_a_conflict() {
    let memory = seeded_store().await;
    let store = Arc::new(ContendedStore::new(memory.clone(), 10));
    let tracker = MasteryTracker::new(store.clone(), 2);

    let err = tracker
        .record_quiz_attempt(STUDENT, &attempt("ionic", 50.0))
        .await
        .unwrap_err();

    match err {
        AppError::Conflict(msg) => assert_eq!(msg, PROGRESS_RETRY_MESSAGE),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    assert!(memory.load_progress(STUDENT, "plan-1").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_subtopic_is_fatal_and_writes_nothing() {
    let store = seeded_store().await;
    let tracker = MasteryTracker::new(store.clone(), 3);

    // The lesson resolves, but its subtopic is not part of the plan.
    store
        .insert_lesson(
            STUDENT,
            "lesson-metallic",
            LessonParent {
                lesson_plan_id: "plan-1".to_string(),
                subtopic_id: "metallic".to_string(),
            },
        )
        .await;

    let err = tracker
        .record_lesson_completion(STUDENT, "lesson-metallic", 20)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(store.load_progress(STUDENT, "plan-1").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_plan_is_fatal() {
    let store = seeded_store().await;
    let tracker = MasteryTracker::new(store.clone(), 3);

    let err = tracker
        .initialize_progress(STUDENT, "plan-missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn mastering_every_subtopic_completes_the_plan() {
    let store = seeded_store().await;
    let tracker = MasteryTracker::new(store.clone(), 3);

    tracker
        .record_lesson_completion(STUDENT, "lesson-ionic", 25)
        .await
        .unwrap();
    for subtopic in ["ionic", "covalent"] {
        tracker
            .record_quiz_attempt(STUDENT, &attempt(subtopic, 50.0))
            .await
            .unwrap();
        tracker
            .record_quiz_attempt(STUDENT, &attempt(subtopic, 90.0))
            .await
            .unwrap();
    }

    let progress = tracker.get_progress(STUDENT, "plan-1").await.unwrap();
    assert_eq!(progress.overall_progress.completed_subtopics, 2);
    assert_eq!(progress.overall_progress.percent_complete, 100.0);
    assert!((progress.overall_progress.average_score - 70.0).abs() < 1e-9);
    assert_eq!(progress.overall_progress.total_study_time, 25);
    assert!(progress.subtopic_progress["ionic"].lesson_completed);
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let store = seeded_store().await;
    let tracker = MasteryTracker::new(store.clone(), 3);

    let (first, created) = tracker
        .initialize_progress(STUDENT, "plan-1")
        .await
        .unwrap();
    let (second, created_again) = tracker
        .initialize_progress(STUDENT, "plan-1")
        .await
        .unwrap();

    assert!(created);
    assert!(!created_again);
    assert_eq!(first.version, 1);
    assert_eq!(second.version, 1);
    assert_eq!(second.overall_progress.total_subtopics, 2);
    assert!(
        second
            .subtopic_progress
            .values()
            .all(|sp| sp.status == SubtopicStatus::NotStarted)
    );
}

#[tokio::test]
async fn submit_stores_the_attempt_with_its_progress() {
    let memory = seeded_store().await;
    insert_quiz(&memory, "quiz-covalent", "lesson-covalent", "covalent").await;
    let store = Arc::new(ContendedStore::new(memory.clone(), 2));
    let platform = platform_over(store, 3);

    let result = platform
        .submit_quiz(STUDENT, "quiz-covalent", &answer("Covalent"))
        .await
        .unwrap();
    assert_eq!(result.attempt.score.percentage, 100.0);

    let attempts = memory.attempts(STUDENT).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].id, result.attempt.id);

    let progress = memory.load_progress(STUDENT, "plan-1").await.unwrap().unwrap();
    assert_eq!(progress.subtopic_progress["covalent"].quiz_attempts, 1);
}

#[tokio::test]
async fn rejected_submissions_leave_no_attempt_behind() {
    let memory = seeded_store().await;
    insert_quiz(&memory, "quiz-covalent", "lesson-covalent", "covalent").await;
    let store = Arc::new(ContendedStore::new(memory.clone(), u32::MAX));
    let platform = platform_over(store, 2);

    for _ in 0..2 {
        let err = platform
            .submit_quiz(STUDENT, "quiz-covalent", &answer("Ionic"))
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(msg) => assert_eq!(msg, PROGRESS_RETRY_MESSAGE),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    assert!(memory.attempts(STUDENT).await.is_empty());
    assert!(memory.load_progress(STUDENT, "plan-1").await.unwrap().is_none());
}

#[tokio::test]
async fn submission_for_an_unknown_lesson_records_nothing() {
    let memory = seeded_store().await;
    insert_quiz(&memory, "quiz-orphan", "lesson-missing", "covalent").await;
    insert_quiz(&memory, "quiz-metallic", "lesson-metallic", "metallic").await;
    memory
        .insert_lesson(
            STUDENT,
            "lesson-metallic",
            LessonParent {
                lesson_plan_id: "plan-1".to_string(),
                subtopic_id: "metallic".to_string(),
            },
        )
        .await;
    let platform = platform_over(memory.clone(), 3);

    for quiz_id in ["quiz-orphan", "quiz-metallic"] {
        let err = platform
            .submit_quiz(STUDENT, quiz_id, &answer("Covalent"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    assert!(memory.attempts(STUDENT).await.is_empty());
    assert!(memory.load_progress(STUDENT, "plan-1").await.unwrap().is_none());
}
