use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::AttemptSession;
use crate::db::types::SessionStatus;
use crate::services::grading::{AnswerPayload, QuestionSnapshot};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, question_snapshot, saved_answers, \
    status, started_at, expires_at, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<AttemptSession>, sqlx::Error> {
    sqlx::query_as::<_, AttemptSession>(&format!(
        "SELECT {COLUMNS} FROM attempt_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn find_active_for_student(
    pool: &PgPool,
    student_id: &str,
    exam_id: &str,
) -> Result<Option<AttemptSession>, sqlx::Error> {
    sqlx::query_as::<_, AttemptSession>(&format!(
        "SELECT {COLUMNS} FROM attempt_sessions
         WHERE student_id = $1 AND exam_id = $2 AND status = $3
         ORDER BY started_at DESC
         LIMIT 1"
    ))
    .bind(student_id)
    .bind(exam_id)
    .bind(SessionStatus::Active)
    .fetch_optional(pool)
    .await
}

pub(crate) struct CreateSession<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) question_snapshot: Vec<QuestionSnapshot>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateSession<'_>,
) -> Result<AttemptSession, sqlx::Error> {
    sqlx::query_as::<_, AttemptSession>(&format!(
        "INSERT INTO attempt_sessions (
            id, exam_id, student_id, attempt_number, question_snapshot, saved_answers,
            status, started_at, expires_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,'[]',$6,$7,$8,$9,$10)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.attempt_number)
    .bind(Json(params.question_snapshot))
    .bind(SessionStatus::Active)
    .bind(params.started_at)
    .bind(params.expires_at)
    .bind(params.now)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn save_answers(
    pool: &PgPool,
    id: &str,
    answers: &[AnswerPayload],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempt_sessions SET saved_answers = $1, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(Json(answers))
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Active)
    .execute(pool)
    .await?;
    Ok(())
}

/// Moves an active session to a terminal status. Returns false when the
/// session was not active anymore, which lets callers treat a second expiry
/// signal as a no-op. Takes any executor so the claim can share a
/// transaction with the ledger write.
pub(crate) async fn finish<'e, E>(
    executor: E,
    id: &str,
    status: SessionStatus,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE attempt_sessions SET status = $1, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(status)
    .bind(now)
    .bind(id)
    .bind(SessionStatus::Active)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_expired_active(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<AttemptSession>, sqlx::Error> {
    sqlx::query_as::<_, AttemptSession>(&format!(
        "SELECT {COLUMNS} FROM attempt_sessions
         WHERE status = $1 AND expires_at <= $2
         ORDER BY expires_at ASC"
    ))
    .bind(SessionStatus::Active)
    .bind(now)
    .fetch_all(pool)
    .await
}
