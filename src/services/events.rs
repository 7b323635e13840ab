use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::types::NotificationKind;
use crate::repositories;

/// Events emitted by the engine for delivery as in-app notifications.
#[derive(Debug, Clone)]
pub(crate) enum OutboundEvent {
    /// A new exam is open to a grade; fanned out to every active student in
    /// that grade.
    ExamAvailable { grade_level: i32, exam_title: String, subject: String },
    ResultReady { student_id: String, exam_title: String, percentage: f64, passed: bool },
    VideoUnlocked { student_id: String, video_title: String },
}

/// Writes notification rows for the event. Delivery is best-effort: a failure
/// here is logged and never propagated, the triggering operation already
/// succeeded.
pub(crate) async fn dispatch(pool: &PgPool, event: OutboundEvent) {
    if let Err(err) = dispatch_inner(pool, &event).await {
        tracing::error!(error = %err, ?event, "Failed to deliver notification");
        metrics::counter!("studygate_notifications_failed_total").increment(1);
    }
}

async fn dispatch_inner(pool: &PgPool, event: &OutboundEvent) -> Result<(), sqlx::Error> {
    let now = primitive_now_utc();

    match event {
        OutboundEvent::ExamAvailable { grade_level, exam_title, subject } => {
            let recipients =
                repositories::users::list_student_ids_by_grade(pool, *grade_level).await?;
            let message = format!("A new {subject} exam \"{exam_title}\" is now available");
            for recipient_id in &recipients {
                create_row(pool, recipient_id, "New exam available", &message, NotificationKind::ExamAvailable, now)
                    .await?;
            }
            tracing::info!(grade_level, recipients = recipients.len(), "Exam availability fan-out");
        }
        OutboundEvent::ResultReady { student_id, exam_title, percentage, passed } => {
            let verdict = if *passed { "passed" } else { "did not pass" };
            let message =
                format!("You scored {percentage:.2}% on \"{exam_title}\" and {verdict}");
            create_row(pool, student_id, "Exam result ready", &message, NotificationKind::ExamResult, now)
                .await?;
        }
        OutboundEvent::VideoUnlocked { student_id, video_title } => {
            let message = format!("Video \"{video_title}\" is now unlocked for you");
            create_row(pool, student_id, "Video unlocked", &message, NotificationKind::VideoUnlocked, now)
                .await?;
        }
    }

    Ok(())
}

async fn create_row(
    pool: &PgPool,
    recipient_id: &str,
    title: &str,
    message: &str,
    kind: NotificationKind,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    repositories::notifications::create(
        pool,
        repositories::notifications::CreateNotification {
            id: &Uuid::new_v4().to_string(),
            recipient_id,
            title,
            message,
            kind,
            now,
        },
    )
    .await
}
