use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Exam;

pub(crate) const COLUMNS: &str = "\
    id, title, subject, grade_level, chapter, duration_seconds, passing_score, \
    max_attempts, total_points, start_date, end_date, is_active, created_by, \
    created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

#[derive(Debug, Default)]
pub(crate) struct ExamFilter {
    pub(crate) grade_level: Option<i32>,
    pub(crate) subject: Option<String>,
    /// Restrict to active exams whose window contains `now`.
    pub(crate) available_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn list(pool: &PgPool, filter: &ExamFilter) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exams WHERE TRUE"));

    if let Some(grade_level) = filter.grade_level {
        builder.push(" AND grade_level = ");
        builder.push_bind(grade_level);
    }

    if let Some(subject) = &filter.subject {
        builder.push(" AND subject = ");
        builder.push_bind(subject);
    }

    if let Some(now) = filter.available_at {
        builder.push(" AND is_active = TRUE AND start_date <= ");
        builder.push_bind(now);
        builder.push(" AND end_date > ");
        builder.push_bind(now);
    }

    builder.push(" ORDER BY start_date DESC");

    builder.build_query_as::<Exam>().fetch_all(pool).await
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) subject: &'a str,
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<&'a str>,
    pub(crate) duration_seconds: i32,
    pub(crate) passing_score: f64,
    pub(crate) max_attempts: i32,
    pub(crate) total_points: i32,
    pub(crate) start_date: PrimitiveDateTime,
    pub(crate) end_date: PrimitiveDateTime,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, subject, grade_level, chapter, duration_seconds, passing_score,
            max_attempts, total_points, start_date, end_date, is_active, created_by,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,TRUE,$12,$13,$14)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.subject)
    .bind(params.grade_level)
    .bind(params.chapter)
    .bind(params.duration_seconds)
    .bind(params.passing_score)
    .bind(params.max_attempts)
    .bind(params.total_points)
    .bind(params.start_date)
    .bind(params.end_date)
    .bind(params.created_by)
    .bind(params.now)
    .bind(params.now)
    .fetch_one(&mut **tx)
    .await
}

pub(crate) struct UpdateExam {
    pub(crate) title: Option<String>,
    pub(crate) chapter: Option<String>,
    pub(crate) duration_seconds: Option<i32>,
    pub(crate) passing_score: Option<f64>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) start_date: Option<PrimitiveDateTime>,
    pub(crate) end_date: Option<PrimitiveDateTime>,
    pub(crate) is_active: Option<bool>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateExam,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE exams SET
            title = COALESCE($1, title),
            chapter = COALESCE($2, chapter),
            duration_seconds = COALESCE($3, duration_seconds),
            passing_score = COALESCE($4, passing_score),
            max_attempts = COALESCE($5, max_attempts),
            start_date = COALESCE($6, start_date),
            end_date = COALESCE($7, end_date),
            is_active = COALESCE($8, is_active),
            updated_at = $9
         WHERE id = $10",
    )
    .bind(params.title)
    .bind(params.chapter)
    .bind(params.duration_seconds)
    .bind(params.passing_score)
    .bind(params.max_attempts)
    .bind(params.start_date)
    .bind(params.end_date)
    .bind(params.is_active)
    .bind(params.now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn deactivate(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET is_active = FALSE, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
