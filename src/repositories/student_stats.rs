use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::StudentStat;

pub(crate) async fn find_for_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Option<StudentStat>, sqlx::Error> {
    sqlx::query_as::<_, StudentStat>(
        "SELECT student_id, exams_taken, average_score, updated_at
         FROM student_stats WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn upsert(
    pool: &PgPool,
    student_id: &str,
    exams_taken: i32,
    average_score: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO student_stats (student_id, exams_taken, average_score, updated_at)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (student_id) DO UPDATE
         SET exams_taken = EXCLUDED.exams_taken,
             average_score = EXCLUDED.average_score,
             updated_at = EXCLUDED.updated_at",
    )
    .bind(student_id)
    .bind(exams_taken)
    .bind(average_score)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
