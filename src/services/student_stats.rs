use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::repositories;

/// Recomputes the derived stats row from the full attempt ledger. Running the
/// whole aggregate on every submit keeps the row correct under concurrent
/// submissions without any incremental bookkeeping.
pub(crate) async fn recompute(pool: &PgPool, student_id: &str) -> Result<(), sqlx::Error> {
    let aggregate = repositories::attempts::aggregate_for_student(pool, student_id).await?;
    let exams_taken = i32::try_from(aggregate.exams_taken).unwrap_or(i32::MAX);
    let average_score = (aggregate.average_score * 100.0).round() / 100.0;

    repositories::student_stats::upsert(
        pool,
        student_id,
        exams_taken,
        average_score,
        primitive_now_utc(),
    )
    .await
}
