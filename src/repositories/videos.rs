use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Video;

pub(crate) const COLUMNS: &str = "\
    id, title, subject, grade_level, chapter, url, required_exam_id, \
    minimum_score, created_by, created_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(&format!("SELECT {COLUMNS} FROM videos WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Videos whose access depends on the given exam's scores.
pub(crate) async fn list_gated_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(&format!(
        "SELECT {COLUMNS} FROM videos WHERE required_exam_id = $1"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default)]
pub(crate) struct VideoFilter {
    pub(crate) grade_level: Option<i32>,
    pub(crate) subject: Option<String>,
}

pub(crate) async fn list(pool: &PgPool, filter: &VideoFilter) -> Result<Vec<Video>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM videos WHERE TRUE"));

    if let Some(grade_level) = filter.grade_level {
        builder.push(" AND grade_level = ");
        builder.push_bind(grade_level);
    }

    if let Some(subject) = &filter.subject {
        builder.push(" AND subject = ");
        builder.push_bind(subject);
    }

    builder.push(" ORDER BY created_at DESC");

    builder.build_query_as::<Video>().fetch_all(pool).await
}

pub(crate) struct CreateVideo<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) subject: &'a str,
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<&'a str>,
    pub(crate) url: &'a str,
    pub(crate) required_exam_id: Option<&'a str>,
    pub(crate) minimum_score: Option<f64>,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateVideo<'_>) -> Result<Video, sqlx::Error> {
    sqlx::query_as::<_, Video>(&format!(
        "INSERT INTO videos (
            id, title, subject, grade_level, chapter, url, required_exam_id,
            minimum_score, created_by, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.subject)
    .bind(params.grade_level)
    .bind(params.chapter)
    .bind(params.url)
    .bind(params.required_exam_id)
    .bind(params.minimum_score)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(pool)
    .await
}
