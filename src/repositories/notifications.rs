use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Notification;
use crate::db::types::NotificationKind;

pub(crate) const COLUMNS: &str =
    "id, recipient_id, title, message, kind, is_read, created_at";

pub(crate) struct CreateNotification<'a> {
    pub(crate) id: &'a str,
    pub(crate) recipient_id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) message: &'a str,
    pub(crate) kind: NotificationKind,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateNotification<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, title, message, kind, is_read, created_at)
         VALUES ($1,$2,$3,$4,$5,FALSE,$6)",
    )
    .bind(params.id)
    .bind(params.recipient_id)
    .bind(params.title)
    .bind(params.message)
    .bind(params.kind)
    .bind(params.now)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_for_recipient(
    pool: &PgPool,
    recipient_id: &str,
    limit: i64,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(&format!(
        "SELECT {COLUMNS} FROM notifications
         WHERE recipient_id = $1
         ORDER BY created_at DESC
         LIMIT $2"
    ))
    .bind(recipient_id)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn mark_read(
    pool: &PgPool,
    id: &str,
    recipient_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2",
    )
    .bind(id)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
