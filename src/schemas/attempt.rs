use serde::{Deserialize, Serialize};

use crate::core::time::format_primitive;
use crate::db::models::{Attempt, AttemptSession};
use crate::schemas::exam::RedactedQuestion;
use crate::services::grading::{AnswerPayload, AnswerRecord};

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    pub(crate) session_id: String,
    pub(crate) answers: Vec<AnswerPayload>,
    pub(crate) time_spent_seconds: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveAnswersRequest {
    pub(crate) answers: Vec<AnswerPayload>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) session_id: String,
    pub(crate) exam_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) questions: Vec<RedactedQuestion>,
    pub(crate) saved_answers: Vec<AnswerPayload>,
    pub(crate) started_at: String,
    pub(crate) expires_at: String,
}

impl SessionResponse {
    pub(crate) fn from_session(session: &AttemptSession) -> Self {
        Self {
            session_id: session.id.clone(),
            exam_id: session.exam_id.clone(),
            attempt_number: session.attempt_number,
            questions: session
                .question_snapshot
                .0
                .iter()
                .map(RedactedQuestion::from_snapshot)
                .collect(),
            saved_answers: session.saved_answers.0.clone(),
            started_at: format_primitive(session.started_at),
            expires_at: format_primitive(session.expires_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitResult {
    pub(crate) attempt_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) score: i32,
    pub(crate) total_points: i32,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) total_questions: usize,
    pub(crate) correct_answers: usize,
    pub(crate) auto_submitted: bool,
}

impl SubmitResult {
    pub(crate) fn from_attempt(attempt: &Attempt) -> Self {
        let records: &[AnswerRecord] = &attempt.answers.0;
        Self {
            attempt_id: attempt.id.clone(),
            attempt_number: attempt.attempt_number,
            score: attempt.score,
            total_points: attempt.total_points,
            percentage: attempt.percentage,
            passed: attempt.passed,
            total_questions: records.len(),
            correct_answers: records.iter().filter(|record| record.is_correct).count(),
            auto_submitted: attempt.auto_submitted,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) score: i32,
    pub(crate) total_points: i32,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) time_spent_seconds: i32,
    pub(crate) auto_submitted: bool,
    pub(crate) submitted_at: String,
}

impl AttemptResponse {
    pub(crate) fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            id: attempt.id.clone(),
            exam_id: attempt.exam_id.clone(),
            student_id: attempt.student_id.clone(),
            attempt_number: attempt.attempt_number,
            score: attempt.score,
            total_points: attempt.total_points,
            percentage: attempt.percentage,
            passed: attempt.passed,
            time_spent_seconds: attempt.time_spent_seconds,
            auto_submitted: attempt.auto_submitted,
            submitted_at: format_primitive(attempt.submitted_at),
        }
    }
}
