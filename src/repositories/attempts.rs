use sqlx::{PgExecutor, PgPool};

use crate::db::models::Attempt;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, answers, score, total_points, \
    percentage, passed, time_spent_seconds, auto_submitted, started_at, submitted_at";

/// Outcome of the atomic ledger insert. A unique violation on
/// (student_id, exam_id, attempt_number) means another submission already
/// claimed the slot; the caller surfaces that as a conflict instead of
/// double-counting the attempt.
#[derive(Debug)]
pub(crate) enum AttemptInsert {
    Inserted(Attempt),
    Conflict,
}

pub(crate) async fn insert<'e, E>(
    executor: E,
    attempt: &Attempt,
) -> Result<AttemptInsert, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO attempts (
            id, exam_id, student_id, attempt_number, answers, score, total_points,
            percentage, passed, time_spent_seconds, auto_submitted, started_at, submitted_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
        RETURNING {COLUMNS}",
    ))
    .bind(&attempt.id)
    .bind(&attempt.exam_id)
    .bind(&attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(&attempt.answers)
    .bind(attempt.score)
    .bind(attempt.total_points)
    .bind(attempt.percentage)
    .bind(attempt.passed)
    .bind(attempt.time_spent_seconds)
    .bind(attempt.auto_submitted)
    .bind(attempt.started_at)
    .bind(attempt.submitted_at)
    .fetch_one(executor)
    .await;

    match result {
        Ok(inserted) => Ok(AttemptInsert::Inserted(inserted)),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Ok(AttemptInsert::Conflict)
        }
        Err(err) => Err(err),
    }
}

/// Sole source of truth for how many attempt slots a student has used.
pub(crate) async fn count_for_student(
    pool: &PgPool,
    student_id: &str,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE student_id = $1 AND exam_id = $2")
        .bind(student_id)
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

/// The passing attempt with the highest percentage, else the highest
/// percentage overall, else none.
pub(crate) async fn best_for_student(
    pool: &PgPool,
    student_id: &str,
    exam_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE student_id = $1 AND exam_id = $2
         ORDER BY passed DESC, percentage DESC, attempt_number ASC
         LIMIT 1"
    ))
    .bind(student_id)
    .bind(exam_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_for_student_exam(
    pool: &PgPool,
    student_id: &str,
    exam_id: &str,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE student_id = $1 AND exam_id = $2
         ORDER BY attempt_number ASC"
    ))
    .bind(student_id)
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_for_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts
         WHERE exam_id = $1
         ORDER BY percentage DESC, submitted_at ASC"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

/// Per-exam rollup for the student-facing exam listing.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StudentExamStats {
    pub(crate) exam_id: String,
    pub(crate) attempts_used: i64,
    pub(crate) best_percentage: f64,
    pub(crate) any_passed: bool,
}

pub(crate) async fn stats_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<StudentExamStats>, sqlx::Error> {
    sqlx::query_as::<_, StudentExamStats>(
        "SELECT exam_id,
                COUNT(*) AS attempts_used,
                MAX(percentage) AS best_percentage,
                BOOL_OR(passed) AS any_passed
         FROM attempts
         WHERE student_id = $1
         GROUP BY exam_id",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}

/// Best passing percentage per exam, for batch gating decisions.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PassingBest {
    pub(crate) exam_id: String,
    pub(crate) best_percentage: f64,
}

pub(crate) async fn passing_best_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<PassingBest>, sqlx::Error> {
    sqlx::query_as::<_, PassingBest>(
        "SELECT exam_id, MAX(percentage) AS best_percentage
         FROM attempts
         WHERE student_id = $1 AND passed
         GROUP BY exam_id",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}

/// Ledger-wide aggregate for one student, used to recompute the derived
/// student_stats row after every submit.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LedgerAggregate {
    pub(crate) exams_taken: i64,
    pub(crate) average_score: f64,
}

pub(crate) async fn aggregate_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<LedgerAggregate, sqlx::Error> {
    sqlx::query_as::<_, LedgerAggregate>(
        "SELECT COUNT(DISTINCT exam_id) AS exams_taken,
                COALESCE(AVG(percentage), 0) AS average_score
         FROM attempts
         WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_one(pool)
    .await
}
