use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Exam;
use crate::repositories;
use crate::services::attempt_flow;

/// Background loop that auto-submits sessions whose deadline has passed.
/// Students who drop offline still get their saved answers graded, and the
/// attempt slot is consumed exactly once because the ledger insert is the
/// arbiter.
pub(crate) async fn run_session_sweep(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval = Duration::from_secs(state.settings().exam().session_sweep_interval_seconds);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(interval_seconds = interval.as_secs(), "Session expiry sweep started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = sweep_once(&state).await {
                    tracing::error!(error = %err, "Session expiry sweep failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("Session expiry sweep stopping");
                    return;
                }
            }
        }
    }
}

async fn sweep_once(state: &AppState) -> Result<(), sqlx::Error> {
    let pool = state.db();
    let expired = repositories::sessions::list_expired_active(pool, primitive_now_utc()).await?;
    if expired.is_empty() {
        return Ok(());
    }

    let mut exams: HashMap<String, Exam> = HashMap::new();
    let mut submitted = 0usize;

    for session in &expired {
        let exam = match exams.get(&session.exam_id) {
            Some(exam) => exam.clone(),
            None => match repositories::exams::find_by_id(pool, &session.exam_id).await? {
                Some(exam) => {
                    exams.insert(session.exam_id.clone(), exam.clone());
                    exam
                }
                None => {
                    tracing::warn!(
                        session_id = %session.id,
                        exam_id = %session.exam_id,
                        "Expired session references missing exam"
                    );
                    continue;
                }
            },
        };

        match attempt_flow::finalize_expired(pool, session, &exam).await {
            Ok(Some(attempt)) => {
                submitted += 1;
                tracing::info!(
                    session_id = %session.id,
                    student_id = %attempt.student_id,
                    exam_id = %attempt.exam_id,
                    percentage = attempt.percentage,
                    "Expired session auto-submitted"
                );
            }
            // Finalized elsewhere between listing and here.
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    error = %err,
                    session_id = %session.id,
                    "Failed to auto-submit expired session"
                );
            }
        }
    }

    if submitted > 0 {
        metrics::counter!("studygate_sessions_auto_submitted_total").increment(submitted as u64);
    }

    Ok(())
}
