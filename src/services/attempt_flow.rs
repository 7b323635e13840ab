use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::core::config::ExamSettings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Attempt, AttemptSession, Exam};
use crate::db::types::SessionStatus;
use crate::repositories;
use crate::repositories::attempts::AttemptInsert;
use crate::services::events::{self, OutboundEvent};
use crate::services::gating;
use crate::services::grading::{self, AnswerPayload, QuestionSnapshot};
use crate::services::student_stats;

/// Why a start request is refused. The reason travels to the client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeniedReason {
    ExamInactive,
    WindowNotOpen,
    WindowClosed,
    AttemptsExhausted,
}

impl DeniedReason {
    pub(crate) fn detail(self) -> &'static str {
        match self {
            DeniedReason::ExamInactive => "Exam is not active",
            DeniedReason::WindowNotOpen => "Exam has not started yet",
            DeniedReason::WindowClosed => "Exam window has closed",
            DeniedReason::AttemptsExhausted => "No attempts remaining",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum AttemptFlowError {
    #[error("{}", .0.detail())]
    NotAllowed(DeniedReason),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Window and quota check for starting an attempt. The window is inclusive of
/// start and exclusive of end. Passing this check only authorizes opening a
/// session; the ledger's unique slot constraint remains the final arbiter.
pub(crate) fn check_can_start(
    exam: &Exam,
    now: PrimitiveDateTime,
    attempts_used: i64,
) -> Result<(), DeniedReason> {
    if !exam.is_active {
        return Err(DeniedReason::ExamInactive);
    }
    if now < exam.start_date {
        return Err(DeniedReason::WindowNotOpen);
    }
    if now >= exam.end_date {
        return Err(DeniedReason::WindowClosed);
    }
    if attempts_used >= i64::from(exam.max_attempts) {
        return Err(DeniedReason::AttemptsExhausted);
    }
    Ok(())
}

/// Where a manual submit lands relative to the session deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubmitTiming {
    OnTime,
    /// Past the deadline but within the grace window; handled as the
    /// auto-submit path.
    Grace,
    TooLate,
}

pub(crate) fn classify_submit_time(
    now: PrimitiveDateTime,
    expires_at: PrimitiveDateTime,
    grace_seconds: u64,
) -> SubmitTiming {
    if now <= expires_at {
        return SubmitTiming::OnTime;
    }
    let grace_end = expires_at + Duration::seconds(grace_seconds as i64);
    if now <= grace_end {
        SubmitTiming::Grace
    } else {
        SubmitTiming::TooLate
    }
}

/// Opens a session for the student, or resumes the one already open. The
/// question set is frozen into the session at this point; later edits to the
/// exam do not affect what this attempt is graded on.
pub(crate) async fn start_attempt(
    pool: &PgPool,
    exam: &Exam,
    student_id: &str,
) -> Result<AttemptSession, AttemptFlowError> {
    let now = primitive_now_utc();
    let attempts_used = repositories::attempts::count_for_student(pool, student_id, &exam.id).await?;

    check_can_start(exam, now, attempts_used).map_err(AttemptFlowError::NotAllowed)?;

    if let Some(open) =
        repositories::sessions::find_active_for_student(pool, student_id, &exam.id).await?
    {
        if now < open.expires_at {
            return Ok(open);
        }
        // Expired but not yet swept; finalize it before opening a fresh one.
        finalize_expired(pool, &open, exam).await?;
        let attempts_used =
            repositories::attempts::count_for_student(pool, student_id, &exam.id).await?;
        check_can_start(exam, now, attempts_used).map_err(AttemptFlowError::NotAllowed)?;
    }

    let questions = repositories::questions::list_by_exam(pool, &exam.id).await?;
    if questions.is_empty() {
        return Err(AttemptFlowError::Validation("Exam has no questions".to_string()));
    }
    let snapshot: Vec<QuestionSnapshot> =
        questions.iter().map(QuestionSnapshot::from_question).collect();

    let attempts_used = repositories::attempts::count_for_student(pool, student_id, &exam.id).await?;
    let attempt_number = i32::try_from(attempts_used).unwrap_or(i32::MAX - 1) + 1;
    let expires_at = session_deadline(now, exam.duration_seconds, exam.end_date);

    let session = repositories::sessions::create(
        pool,
        repositories::sessions::CreateSession {
            id: &Uuid::new_v4().to_string(),
            exam_id: &exam.id,
            student_id,
            attempt_number,
            question_snapshot: snapshot,
            started_at: now,
            expires_at,
            now,
        },
    )
    .await?;

    tracing::info!(
        exam_id = %exam.id,
        student_id = %student_id,
        session_id = %session.id,
        attempt_number,
        "Attempt session opened"
    );

    Ok(session)
}

/// Which answers an accepted submission grades. Past the deadline the client
/// payload is discarded; only answers persisted before expiry count, exactly
/// as if the server had auto-submitted.
fn graded_answers<'a>(
    timing: SubmitTiming,
    submitted: &'a [AnswerPayload],
    saved: &'a [AnswerPayload],
) -> Option<&'a [AnswerPayload]> {
    match timing {
        SubmitTiming::OnTime => Some(submitted),
        SubmitTiming::Grace => Some(saved),
        SubmitTiming::TooLate => None,
    }
}

/// Grades the session and writes the ledger entry. A manual submit past the
/// grace window is refused; the expiry sweep owns that session instead.
pub(crate) async fn submit_attempt(
    pool: &PgPool,
    settings: &ExamSettings,
    session: &AttemptSession,
    exam: &Exam,
    answers: &[AnswerPayload],
    time_spent_seconds: Option<i32>,
) -> Result<Attempt, AttemptFlowError> {
    if session.status.is_terminal() {
        return Err(AttemptFlowError::Conflict("Attempt already submitted"));
    }

    let now = primitive_now_utc();
    let timing = classify_submit_time(now, session.expires_at, settings.submit_grace_seconds);

    let Some(answers) = graded_answers(timing, answers, &session.saved_answers.0) else {
        finalize_expired(pool, session, exam).await?;
        return Err(AttemptFlowError::Conflict("Attempt time expired"));
    };

    // The grace band is clock-skew tolerance for when finalization happens,
    // never for what is graded: a grace submit takes the auto-submit path.
    let (time_spent, auto_submitted, status) = match timing {
        SubmitTiming::OnTime => {
            let time_spent = time_spent_seconds
                .unwrap_or_else(|| elapsed_seconds(session.started_at, now))
                .clamp(0, exam.duration_seconds);
            (time_spent, false, SessionStatus::Submitted)
        }
        _ => (exam.duration_seconds, true, SessionStatus::AutoSubmitted),
    };

    finalize(pool, session, exam, answers, time_spent, auto_submitted, status, now).await
}

/// Walks away from an active session without grading. No ledger entry is
/// written, so the attempt slot stays free.
pub(crate) async fn abandon(
    pool: &PgPool,
    session: &AttemptSession,
) -> Result<(), AttemptFlowError> {
    if session.status.is_terminal() {
        return Err(AttemptFlowError::Conflict("Attempt already submitted"));
    }
    let abandoned =
        repositories::sessions::finish(pool, &session.id, SessionStatus::Abandoned, primitive_now_utc())
            .await?;
    if !abandoned {
        return Err(AttemptFlowError::Conflict("Attempt already submitted"));
    }
    tracing::info!(session_id = %session.id, "Attempt session abandoned");
    Ok(())
}

/// Auto-submits an expired session with whatever answers were saved.
/// Idempotent: a session already moved out of Active is left alone.
pub(crate) async fn finalize_expired(
    pool: &PgPool,
    session: &AttemptSession,
    exam: &Exam,
) -> Result<Option<Attempt>, AttemptFlowError> {
    let now = primitive_now_utc();
    match finalize(
        pool,
        session,
        exam,
        &session.saved_answers.0,
        exam.duration_seconds,
        true,
        SessionStatus::AutoSubmitted,
        now,
    )
    .await
    {
        Ok(attempt) => Ok(Some(attempt)),
        Err(AttemptFlowError::Conflict(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

#[allow(clippy::too_many_arguments)]
async fn finalize(
    pool: &PgPool,
    session: &AttemptSession,
    exam: &Exam,
    answers: &[AnswerPayload],
    time_spent_seconds: i32,
    auto_submitted: bool,
    status: SessionStatus,
    now: PrimitiveDateTime,
) -> Result<Attempt, AttemptFlowError> {
    let previous_best =
        repositories::attempts::best_for_student(pool, &session.student_id, &session.exam_id)
            .await?;

    let outcome = grading::grade(&session.question_snapshot.0, exam.passing_score, answers);

    let attempt = Attempt {
        id: Uuid::new_v4().to_string(),
        exam_id: session.exam_id.clone(),
        student_id: session.student_id.clone(),
        attempt_number: session.attempt_number,
        answers: Json(outcome.records),
        score: outcome.score,
        total_points: outcome.total_points,
        percentage: outcome.percentage,
        passed: outcome.passed,
        time_spent_seconds,
        auto_submitted,
        started_at: session.started_at,
        submitted_at: now,
    };

    // The claim and the ledger write commit together. Claiming first makes
    // two concurrent submits race on a single row update instead of both
    // grading; keeping both in one transaction means a failed insert rolls
    // the claim back and the session stays active for a retry.
    let mut tx = pool.begin().await?;

    let claimed = repositories::sessions::finish(&mut *tx, &session.id, status, now).await?;
    if !claimed {
        return Err(AttemptFlowError::Conflict("Attempt already submitted"));
    }

    let attempt = match repositories::attempts::insert(&mut *tx, &attempt).await? {
        AttemptInsert::Inserted(attempt) => {
            tx.commit().await?;
            attempt
        }
        // The slot already holds a graded attempt from a concurrent
        // submission; keep the claim so this session closes out too.
        AttemptInsert::Conflict => {
            tx.commit().await?;
            return Err(AttemptFlowError::Conflict("Attempt already submitted"));
        }
    };

    tracing::info!(
        exam_id = %attempt.exam_id,
        student_id = %attempt.student_id,
        attempt_number = attempt.attempt_number,
        percentage = attempt.percentage,
        passed = attempt.passed,
        auto_submitted,
        "Attempt graded"
    );
    metrics::counter!("studygate_attempts_submitted_total").increment(1);

    student_stats::recompute(pool, &attempt.student_id).await?;

    events::dispatch(
        pool,
        OutboundEvent::ResultReady {
            student_id: attempt.student_id.clone(),
            exam_title: exam.title.clone(),
            percentage: attempt.percentage,
            passed: attempt.passed,
        },
    )
    .await;

    announce_unlocks(pool, &attempt, previous_best.as_ref()).await;

    Ok(attempt)
}

/// Notifies the student about videos this attempt unlocked for the first
/// time. Best-effort: the attempt is already in the ledger.
async fn announce_unlocks(
    pool: &PgPool,
    attempt: &Attempt,
    previous_best: Option<&Attempt>,
) {
    if !attempt.passed {
        return;
    }
    if previous_best.is_some_and(|best| best.passed && best.percentage >= attempt.percentage) {
        return;
    }

    let videos = match repositories::videos::list_gated_by_exam(pool, &attempt.exam_id).await {
        Ok(videos) => videos,
        Err(err) => {
            tracing::error!(error = %err, exam_id = %attempt.exam_id, "Failed to scan gated videos");
            return;
        }
    };

    for video in videos {
        let minimum = video.minimum_score.unwrap_or(0.0);
        let was_unlocked = gating::rule_satisfied(previous_best, minimum);
        if !was_unlocked && attempt.passed && attempt.percentage >= minimum {
            events::dispatch(
                pool,
                OutboundEvent::VideoUnlocked {
                    student_id: attempt.student_id.clone(),
                    video_title: video.title,
                },
            )
            .await;
        }
    }
}

/// The session never outlives the exam window: deadline is the earlier of
/// the full duration and the window end.
fn session_deadline(
    now: PrimitiveDateTime,
    duration_seconds: i32,
    end_date: PrimitiveDateTime,
) -> PrimitiveDateTime {
    (now + Duration::seconds(i64::from(duration_seconds))).min(end_date)
}

fn elapsed_seconds(started_at: PrimitiveDateTime, now: PrimitiveDateTime) -> i32 {
    let elapsed = (now - started_at).whole_seconds();
    i32::try_from(elapsed.max(0)).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn exam_in_window() -> Exam {
        let created = datetime!(2025-01-01 00:00:00);
        Exam {
            id: "exam-1".to_string(),
            title: "Algebra Midterm".to_string(),
            subject: "math".to_string(),
            grade_level: 9,
            chapter: None,
            duration_seconds: 1800,
            passing_score: 70.0,
            max_attempts: 3,
            total_points: 10,
            start_date: datetime!(2025-03-01 08:00:00),
            end_date: datetime!(2025-03-08 08:00:00),
            is_active: true,
            created_by: "tea-1".to_string(),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn start_allowed_inside_window_with_attempts_left() {
        let exam = exam_in_window();
        assert_eq!(check_can_start(&exam, datetime!(2025-03-02 10:00:00), 0), Ok(()));
        assert_eq!(check_can_start(&exam, datetime!(2025-03-02 10:00:00), 2), Ok(()));
    }

    #[test]
    fn start_denied_before_window_opens() {
        let exam = exam_in_window();
        assert_eq!(
            check_can_start(&exam, datetime!(2025-02-28 23:59:59), 0),
            Err(DeniedReason::WindowNotOpen)
        );
    }

    #[test]
    fn window_start_is_inclusive_end_is_exclusive() {
        let exam = exam_in_window();
        assert_eq!(check_can_start(&exam, exam.start_date, 0), Ok(()));
        assert_eq!(check_can_start(&exam, exam.end_date, 0), Err(DeniedReason::WindowClosed));
    }

    #[test]
    fn start_denied_after_window_closes() {
        let exam = exam_in_window();
        assert_eq!(
            check_can_start(&exam, datetime!(2025-03-10 00:00:00), 0),
            Err(DeniedReason::WindowClosed)
        );
    }

    #[test]
    fn start_denied_when_attempts_exhausted() {
        let exam = exam_in_window();
        assert_eq!(
            check_can_start(&exam, datetime!(2025-03-02 10:00:00), 3),
            Err(DeniedReason::AttemptsExhausted)
        );
    }

    #[test]
    fn start_denied_on_inactive_exam() {
        let mut exam = exam_in_window();
        exam.is_active = false;
        assert_eq!(
            check_can_start(&exam, datetime!(2025-03-02 10:00:00), 0),
            Err(DeniedReason::ExamInactive)
        );
    }

    #[test]
    fn submit_on_or_before_deadline_is_on_time() {
        let expires = datetime!(2025-03-02 10:30:00);
        assert_eq!(
            classify_submit_time(datetime!(2025-03-02 10:15:00), expires, 300),
            SubmitTiming::OnTime
        );
        assert_eq!(classify_submit_time(expires, expires, 300), SubmitTiming::OnTime);
    }

    #[test]
    fn submit_within_grace_is_grace() {
        let expires = datetime!(2025-03-02 10:30:00);
        assert_eq!(
            classify_submit_time(datetime!(2025-03-02 10:30:01), expires, 300),
            SubmitTiming::Grace
        );
        assert_eq!(
            classify_submit_time(datetime!(2025-03-02 10:35:00), expires, 300),
            SubmitTiming::Grace
        );
    }

    #[test]
    fn submit_past_grace_is_too_late() {
        let expires = datetime!(2025-03-02 10:30:00);
        assert_eq!(
            classify_submit_time(datetime!(2025-03-02 10:35:01), expires, 300),
            SubmitTiming::TooLate
        );
    }

    #[test]
    fn zero_grace_rejects_any_late_submit() {
        let expires = datetime!(2025-03-02 10:30:00);
        assert_eq!(
            classify_submit_time(datetime!(2025-03-02 10:30:01), expires, 0),
            SubmitTiming::TooLate
        );
    }

    #[test]
    fn session_deadline_is_capped_by_the_window_end() {
        let end = datetime!(2025-03-08 08:00:00);
        assert_eq!(
            session_deadline(datetime!(2025-03-02 10:00:00), 1800, end),
            datetime!(2025-03-02 10:30:00)
        );
        // Starting 10 minutes before the window closes leaves 10 minutes.
        assert_eq!(session_deadline(datetime!(2025-03-08 07:50:00), 1800, end), end);
    }

    #[test]
    fn elapsed_seconds_never_negative() {
        let started = datetime!(2025-03-02 10:00:00);
        assert_eq!(elapsed_seconds(started, datetime!(2025-03-02 10:05:00)), 300);
        assert_eq!(elapsed_seconds(started, datetime!(2025-03-02 09:59:00)), 0);
    }

    #[test]
    fn grace_submissions_grade_only_previously_saved_answers() {
        use crate::services::grading::AnswerValue;

        let submitted = vec![AnswerPayload {
            question_id: "q1".to_string(),
            value: AnswerValue::Boolean(true),
        }];
        let saved = vec![AnswerPayload {
            question_id: "q1".to_string(),
            value: AnswerValue::Boolean(false),
        }];

        assert_eq!(graded_answers(SubmitTiming::OnTime, &submitted, &saved), Some(&submitted[..]));
        // Past the deadline the client payload is discarded; the late submit
        // cannot change what was already persisted.
        assert_eq!(graded_answers(SubmitTiming::Grace, &submitted, &saved), Some(&saved[..]));
        assert_eq!(graded_answers(SubmitTiming::TooLate, &submitted, &saved), None);
    }

    async fn seeded_pool() -> Option<PgPool> {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty())?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .ok()?;
        crate::db::run_migrations(&pool).await.ok()?;
        Some(pool)
    }

    #[tokio::test]
    async fn failed_ledger_write_rolls_back_the_claim_so_submit_can_retry() {
        use crate::db::types::UserRole;
        use crate::services::grading::AnswerValue;
        use sqlx::types::Json;

        let Some(pool) = seeded_pool().await else {
            eprintln!("skipping: DATABASE_URL is not set");
            return;
        };

        let now = primitive_now_utc();
        let suffix = Uuid::new_v4().to_string();

        let teacher = repositories::users::create(
            &pool,
            repositories::users::CreateUser {
                id: &Uuid::new_v4().to_string(),
                email: &format!("teacher-{suffix}@example.test"),
                hashed_password: "not-a-real-hash".to_string(),
                full_name: "Seed Teacher",
                role: UserRole::Teacher,
                grade_level: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("seed teacher");

        let student = repositories::users::create(
            &pool,
            repositories::users::CreateUser {
                id: &Uuid::new_v4().to_string(),
                email: &format!("student-{suffix}@example.test"),
                hashed_password: "not-a-real-hash".to_string(),
                full_name: "Seed Student",
                role: UserRole::Student,
                grade_level: Some(9),
                is_active: true,
                created_at: now,
                updated_at: now,
            },
        )
        .await
        .expect("seed student");

        let mut tx = pool.begin().await.expect("tx");
        let exam = repositories::exams::create(
            &mut tx,
            repositories::exams::CreateExam {
                id: &Uuid::new_v4().to_string(),
                title: "Retry Semantics",
                subject: "math",
                grade_level: 9,
                chapter: None,
                duration_seconds: 1800,
                passing_score: 50.0,
                max_attempts: 3,
                total_points: 1,
                start_date: now - Duration::hours(1),
                end_date: now + Duration::hours(1),
                created_by: &teacher.id,
                now,
            },
        )
        .await
        .expect("seed exam");
        let question = repositories::questions::create(
            &mut tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam.id,
                position: 0,
                prompt: "The sky is blue",
                kind: crate::db::types::QuestionKind::TrueFalse,
                options: Vec::new(),
                answer_true: Some(true),
                points: 1,
                now,
            },
        )
        .await
        .expect("seed question");
        tx.commit().await.expect("commit seed");

        let session = start_attempt(&pool, &exam, &student.id).await.expect("open session");

        // Replay finalize's transaction with an insert the attempts CHECK
        // constraint rejects: the claim must not survive the failed write.
        let bad_attempt = Attempt {
            id: Uuid::new_v4().to_string(),
            exam_id: session.exam_id.clone(),
            student_id: session.student_id.clone(),
            attempt_number: session.attempt_number,
            answers: Json(Vec::new()),
            score: 0,
            total_points: 1,
            percentage: 150.0,
            passed: false,
            time_spent_seconds: 60,
            auto_submitted: false,
            started_at: session.started_at,
            submitted_at: now,
        };

        let mut tx = pool.begin().await.expect("tx");
        let claimed = repositories::sessions::finish(
            &mut *tx,
            &session.id,
            SessionStatus::Submitted,
            now,
        )
        .await
        .expect("claim");
        assert!(claimed);
        let insert_err = repositories::attempts::insert(&mut *tx, &bad_attempt).await;
        assert!(insert_err.is_err(), "constraint violation expected");
        drop(tx);

        let reloaded = repositories::sessions::find_by_id(&pool, &session.id)
            .await
            .expect("reload session")
            .expect("session exists");
        assert_eq!(reloaded.status, SessionStatus::Active);
        assert_eq!(
            repositories::attempts::count_for_student(&pool, &student.id, &exam.id)
                .await
                .expect("count"),
            0
        );

        // The retry now goes through and consumes exactly one slot.
        let settings = ExamSettings { submit_grace_seconds: 300, session_sweep_interval_seconds: 30 };
        let answers = vec![AnswerPayload {
            question_id: question.id.clone(),
            value: AnswerValue::Boolean(true),
        }];
        let attempt = submit_attempt(&pool, &settings, &reloaded, &exam, &answers, Some(60))
            .await
            .expect("retried submit");
        assert!(attempt.passed);
        assert_eq!(
            repositories::attempts::count_for_student(&pool, &student.id, &exam.id)
                .await
                .expect("count"),
            1
        );

        let second = submit_attempt(&pool, &settings, &reloaded, &exam, &answers, Some(60)).await;
        assert!(matches!(second, Err(AttemptFlowError::Conflict(_))));
    }
}
