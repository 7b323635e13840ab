use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{NotificationKind, QuestionKind, SessionStatus, UserRole};
use crate::services::grading::{AnswerPayload, AnswerRecord, QuestionSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) grade_level: Option<i32>,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<String>,
    pub(crate) duration_seconds: i32,
    pub(crate) passing_score: f64,
    pub(crate) max_attempts: i32,
    pub(crate) total_points: i32,
    pub(crate) start_date: PrimitiveDateTime,
    pub(crate) end_date: PrimitiveDateTime,
    pub(crate) is_active: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Option of a single-choice question as stored in the question row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChoiceOption {
    pub(crate) text: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) position: i32,
    pub(crate) prompt: String,
    pub(crate) kind: QuestionKind,
    pub(crate) options: Json<Vec<ChoiceOption>>,
    pub(crate) answer_true: Option<bool>,
    pub(crate) points: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

/// In-progress attempt context. Not a ledger entry: abandoning a session
/// consumes no attempt slot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AttemptSession {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) question_snapshot: Json<Vec<QuestionSnapshot>>,
    pub(crate) saved_answers: Json<Vec<AnswerPayload>>,
    pub(crate) status: SessionStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Immutable ledger entry; one row per graded attempt, unique on
/// (student_id, exam_id, attempt_number).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) answers: Json<Vec<AnswerRecord>>,
    pub(crate) score: i32,
    pub(crate) total_points: i32,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) time_spent_seconds: i32,
    pub(crate) auto_submitted: bool,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) submitted_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Video {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<String>,
    pub(crate) url: String,
    pub(crate) required_exam_id: Option<String>,
    pub(crate) minimum_score: Option<f64>,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Notification {
    pub(crate) id: String,
    pub(crate) recipient_id: String,
    pub(crate) title: String,
    pub(crate) message: String,
    pub(crate) kind: NotificationKind,
    pub(crate) is_read: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentStat {
    pub(crate) student_id: String,
    pub(crate) exams_taken: i32,
    pub(crate) average_score: f64,
    pub(crate) updated_at: PrimitiveDateTime,
}
