use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use time::PrimitiveDateTime;

use crate::db::models::{ChoiceOption, Question};
use crate::db::types::QuestionKind;

pub(crate) const COLUMNS: &str =
    "id, exam_id, position, prompt, kind, options, answer_true, points, created_at";

pub(crate) async fn list_by_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY position ASC"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) position: i32,
    pub(crate) prompt: &'a str,
    pub(crate) kind: QuestionKind,
    pub(crate) options: Vec<ChoiceOption>,
    pub(crate) answer_true: Option<bool>,
    pub(crate) points: i32,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, exam_id, position, prompt, kind, options, answer_true, points, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.position)
    .bind(params.prompt)
    .bind(params.kind)
    .bind(Json(params.options))
    .bind(params.answer_true)
    .bind(params.points)
    .bind(params.now)
    .fetch_one(&mut **tx)
    .await
}
