use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::{Exam, User};
use crate::db::types::UserRole;
use crate::repositories;
use crate::repositories::attempts::StudentExamStats;
use crate::schemas::attempt::{
    AttemptResponse, SaveAnswersRequest, SessionResponse, SubmitRequest, SubmitResult,
};
use crate::schemas::exam::{
    ExamCreate, ExamListQuery, ExamResponse, ExamUpdate, QuestionResponse, RedactedQuestion,
    StudentExamStatus,
};
use crate::services::attempt_flow;
use crate::services::events::{self, OutboundEvent};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_exams).post(create_exam))
        .route("/:id", get(get_exam).patch(update_exam).delete(delete_exam))
        .route("/:id/start", post(start_exam))
        .route("/:id/submit", post(submit_exam))
        .route("/:id/results", get(exam_results))
        .route("/sessions/:session_id", get(get_session).delete(abandon_session))
        .route("/sessions/:session_id/answers", put(save_session_answers))
}

async fn create_exam(
    State(state): State<AppState>,
    CurrentTeacher(teacher): CurrentTeacher,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if payload.end_date <= payload.start_date {
        return Err(ApiError::BadRequest("end_date must be after start_date".to_string()));
    }

    for (index, question) in payload.questions.iter().enumerate() {
        question
            .check_shape()
            .map_err(|message| ApiError::BadRequest(format!("Question {}: {message}", index + 1)))?;
    }

    // Client-sent totals are ignored; the sum of question points is the truth.
    let total_points: i32 = payload.questions.iter().map(|question| question.points).sum();

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to open transaction"))?;

    let exam = repositories::exams::create(
        &mut tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &payload.title,
            subject: &payload.subject,
            grade_level: payload.grade_level,
            chapter: payload.chapter.as_deref(),
            duration_seconds: payload.duration_seconds,
            passing_score: payload.passing_score,
            max_attempts: payload.max_attempts,
            total_points,
            start_date: to_primitive_utc(payload.start_date),
            end_date: to_primitive_utc(payload.end_date),
            created_by: &teacher.id,
            now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    let mut questions = Vec::with_capacity(payload.questions.len());
    for (index, question) in payload.questions.iter().enumerate() {
        let created = repositories::questions::create(
            &mut tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id: &exam_id,
                position: index as i32,
                prompt: &question.prompt,
                kind: question.kind,
                options: question.to_options(),
                answer_true: question.answer_true,
                points: question.points,
                now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
        questions.push(QuestionResponse::from_question(&created));
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit exam"))?;

    tracing::info!(exam_id = %exam.id, grade_level = exam.grade_level, "Exam created");

    events::dispatch(
        state.db(),
        OutboundEvent::ExamAvailable {
            grade_level: exam.grade_level,
            exam_title: exam.title.clone(),
            subject: exam.subject.clone(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, Json(ExamResponse::from_exam(&exam).with_questions(questions))))
}

async fn list_exams(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ExamListQuery>,
) -> Result<Json<Vec<ExamResponse>>, ApiError> {
    let available_at = query.available.unwrap_or(false).then(primitive_now_utc);
    let filter = match user.role {
        UserRole::Teacher => repositories::exams::ExamFilter {
            grade_level: query.grade_level,
            subject: query.subject,
            available_at,
        },
        // Students only see exams for their own grade.
        UserRole::Student => repositories::exams::ExamFilter {
            grade_level: user.grade_level,
            subject: query.subject,
            available_at,
        },
    };

    let exams = repositories::exams::list(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    if user.role == UserRole::Teacher {
        return Ok(Json(exams.iter().map(ExamResponse::from_exam).collect()));
    }

    let stats = repositories::attempts::stats_by_student(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt stats"))?;
    let by_exam: HashMap<&str, &StudentExamStats> =
        stats.iter().map(|stat| (stat.exam_id.as_str(), stat)).collect();

    let now = primitive_now_utc();
    let responses = exams
        .iter()
        .map(|exam| {
            let stat = by_exam.get(exam.id.as_str()).copied();
            ExamResponse::from_exam(exam).with_student_status(student_status(exam, stat, now))
        })
        .collect();

    Ok(Json(responses))
}

fn student_status(
    exam: &Exam,
    stat: Option<&StudentExamStats>,
    now: time::PrimitiveDateTime,
) -> StudentExamStatus {
    let attempts_used = stat.map_or(0, |stat| stat.attempts_used);
    let check = attempt_flow::check_can_start(exam, now, attempts_used);

    StudentExamStatus {
        attempts_used,
        remaining_attempts: (i64::from(exam.max_attempts) - attempts_used).max(0),
        best_score: stat.map(|stat| stat.best_percentage),
        passed: stat.is_some_and(|stat| stat.any_passed),
        can_take: check.is_ok(),
        denied_reason: check.err().map(|reason| reason.detail()),
    }
}

async fn get_exam(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = fetch_exam(&state, &id).await?;

    match user.role {
        UserRole::Teacher => {
            let questions = repositories::questions::list_by_exam(state.db(), &exam.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
            let questions = questions.iter().map(QuestionResponse::from_question).collect();
            Ok(Json(ExamResponse::from_exam(&exam).with_questions(questions)))
        }
        UserRole::Student => {
            require_same_grade(&user, &exam)?;
            let questions = repositories::questions::list_by_exam(state.db(), &exam.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
            let attempts =
                repositories::attempts::count_for_student(state.db(), &user.id, &exam.id)
                    .await
                    .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
            let best = repositories::attempts::best_for_student(state.db(), &user.id, &exam.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load best attempt"))?;

            let now = primitive_now_utc();
            let check = attempt_flow::check_can_start(&exam, now, attempts);
            let status = StudentExamStatus {
                attempts_used: attempts,
                remaining_attempts: (i64::from(exam.max_attempts) - attempts).max(0),
                best_score: best.as_ref().map(|attempt| attempt.percentage),
                passed: best.as_ref().is_some_and(|attempt| attempt.passed),
                can_take: check.is_ok(),
                denied_reason: check.err().map(|reason| reason.detail()),
            };
            Ok(Json(
                ExamResponse::from_exam(&exam)
                    .with_redacted_questions(
                        questions.iter().map(RedactedQuestion::from_question).collect(),
                    )
                    .with_student_status(status),
            ))
        }
    }
}

async fn update_exam(
    State(state): State<AppState>,
    CurrentTeacher(teacher): CurrentTeacher,
    Path(id): Path<String>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let exam = fetch_exam(&state, &id).await?;
    require_owner(&teacher, &exam)?;

    let start = payload.start_date.map(to_primitive_utc).unwrap_or(exam.start_date);
    let end = payload.end_date.map(to_primitive_utc).unwrap_or(exam.end_date);
    if end <= start {
        return Err(ApiError::BadRequest("end_date must be after start_date".to_string()));
    }

    repositories::exams::update(
        state.db(),
        &id,
        repositories::exams::UpdateExam {
            title: payload.title,
            chapter: payload.chapter,
            duration_seconds: payload.duration_seconds,
            passing_score: payload.passing_score,
            max_attempts: payload.max_attempts,
            start_date: payload.start_date.map(to_primitive_utc),
            end_date: payload.end_date.map(to_primitive_utc),
            is_active: payload.is_active,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;

    let updated = fetch_exam(&state, &id).await?;
    Ok(Json(ExamResponse::from_exam(&updated)))
}

/// Deactivation, not deletion: the ledger keeps referencing the exam.
async fn delete_exam(
    State(state): State<AppState>,
    CurrentTeacher(teacher): CurrentTeacher,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let exam = fetch_exam(&state, &id).await?;
    require_owner(&teacher, &exam)?;

    repositories::exams::deactivate(state.db(), &exam.id, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to deactivate exam"))?;

    tracing::info!(exam_id = %exam.id, "Exam deactivated");
    Ok(StatusCode::NO_CONTENT)
}

async fn start_exam(
    State(state): State<AppState>,
    CurrentStudent(student): CurrentStudent,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let exam = fetch_exam(&state, &id).await?;
    require_same_grade(&student, &exam)?;

    let session = attempt_flow::start_attempt(state.db(), &exam, &student.id).await?;
    Ok(Json(SessionResponse::from_session(&session)))
}

async fn get_session(
    State(state): State<AppState>,
    CurrentStudent(student): CurrentStudent,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = fetch_owned_session(&state, &session_id, &student.id).await?;
    Ok(Json(SessionResponse::from_session(&session)))
}

async fn abandon_session(
    State(state): State<AppState>,
    CurrentStudent(student): CurrentStudent,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = fetch_owned_session(&state, &session_id, &student.id).await?;
    attempt_flow::abandon(state.db(), &session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_session_answers(
    State(state): State<AppState>,
    CurrentStudent(student): CurrentStudent,
    Path(session_id): Path<String>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<StatusCode, ApiError> {
    let session = fetch_owned_session(&state, &session_id, &student.id).await?;

    if session.status.is_terminal() {
        return Err(ApiError::Conflict("Attempt already submitted".to_string()));
    }

    repositories::sessions::save_answers(
        state.db(),
        &session.id,
        &payload.answers,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to save answers"))?;

    Ok(StatusCode::NO_CONTENT)
}

async fn submit_exam(
    State(state): State<AppState>,
    CurrentStudent(student): CurrentStudent,
    Path(id): Path<String>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResult>, ApiError> {
    let exam = fetch_exam(&state, &id).await?;
    let session = fetch_owned_session(&state, &payload.session_id, &student.id).await?;

    if session.exam_id != exam.id {
        return Err(ApiError::BadRequest("Session does not belong to this exam".to_string()));
    }

    let attempt = attempt_flow::submit_attempt(
        state.db(),
        state.settings().exam(),
        &session,
        &exam,
        &payload.answers,
        payload.time_spent_seconds,
    )
    .await?;

    Ok(Json(SubmitResult::from_attempt(&attempt)))
}

async fn exam_results(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<AttemptResponse>>, ApiError> {
    let exam = fetch_exam(&state, &id).await?;

    let attempts = match user.role {
        UserRole::Teacher => {
            require_owner(&user, &exam)?;
            repositories::attempts::list_for_exam(state.db(), &exam.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load exam results"))?
        }
        UserRole::Student => {
            repositories::attempts::list_for_student_exam(state.db(), &user.id, &exam.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to load exam results"))?
        }
    };

    Ok(Json(attempts.iter().map(AttemptResponse::from_attempt).collect()))
}

async fn fetch_exam(state: &AppState, id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

async fn fetch_owned_session(
    state: &AppState,
    session_id: &str,
    student_id: &str,
) -> Result<crate::db::models::AttemptSession, ApiError> {
    let session = repositories::sessions::find_by_id(state.db(), session_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load session"))?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    if session.student_id != student_id {
        // Hide the existence of other students' sessions.
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    Ok(session)
}

fn require_same_grade(student: &User, exam: &Exam) -> Result<(), ApiError> {
    if student.grade_level == Some(exam.grade_level) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Exam is not available for your grade"))
    }
}

fn require_owner(teacher: &User, exam: &Exam) -> Result<(), ApiError> {
    if exam.created_by == teacher.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Only the exam owner may do this"))
    }
}
