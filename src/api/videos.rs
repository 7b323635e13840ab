use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentTeacher, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Video;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::video::{VideoCreate, VideoListQuery, VideoResponse};
use crate::services::gating::{self, AccessDecision};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_videos).post(create_video))
        .route("/:id", get(get_video))
        .route("/:id/access", get(video_access))
}

async fn create_video(
    State(state): State<AppState>,
    CurrentTeacher(teacher): CurrentTeacher,
    Json(payload): Json<VideoCreate>,
) -> Result<(StatusCode, Json<VideoResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let Some(exam_id) = &payload.required_exam_id {
        let exam = repositories::exams::find_by_id(state.db(), exam_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load gating exam"))?;
        if exam.is_none() {
            return Err(ApiError::BadRequest("required_exam_id references no exam".to_string()));
        }
    } else if payload.minimum_score.is_some() {
        return Err(ApiError::BadRequest(
            "minimum_score requires required_exam_id".to_string(),
        ));
    }

    let video = repositories::videos::create(
        state.db(),
        repositories::videos::CreateVideo {
            id: &Uuid::new_v4().to_string(),
            title: &payload.title,
            subject: &payload.subject,
            grade_level: payload.grade_level,
            chapter: payload.chapter.as_deref(),
            url: &payload.url,
            required_exam_id: payload.required_exam_id.as_deref(),
            minimum_score: payload.minimum_score,
            created_by: &teacher.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create video"))?;

    tracing::info!(video_id = %video.id, gated = video.required_exam_id.is_some(), "Video created");

    let decision = AccessDecision {
        can_watch: true,
        required_exam_id: video.required_exam_id.clone(),
        minimum_score: video.minimum_score,
        best_score: None,
    };
    Ok((StatusCode::CREATED, Json(VideoResponse::from_video(&video, &decision))))
}

async fn list_videos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<VideoListQuery>,
) -> Result<Json<Vec<VideoResponse>>, ApiError> {
    let filter = match user.role {
        UserRole::Teacher => repositories::videos::VideoFilter {
            grade_level: query.grade_level,
            subject: query.subject,
        },
        UserRole::Student => repositories::videos::VideoFilter {
            grade_level: user.grade_level,
            subject: query.subject,
        },
    };

    let videos = repositories::videos::list(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list videos"))?;

    if user.role == UserRole::Teacher {
        let responses = videos
            .iter()
            .map(|video| {
                let decision = AccessDecision {
                    can_watch: true,
                    required_exam_id: video.required_exam_id.clone(),
                    minimum_score: video.minimum_score,
                    best_score: None,
                };
                VideoResponse::from_video(video, &decision)
            })
            .collect();
        return Ok(Json(responses));
    }

    let decisions = gating::evaluate_batch(state.db(), &videos, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to evaluate video access"))?;

    Ok(Json(
        videos
            .iter()
            .zip(decisions.iter())
            .map(|(video, decision)| VideoResponse::from_video(video, decision))
            .collect(),
    ))
}

async fn get_video(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<VideoResponse>, ApiError> {
    let video = fetch_video(&state, &id).await?;
    let decision = decide(&state, &video, &user.id, user.role).await?;
    Ok(Json(VideoResponse::from_video(&video, &decision)))
}

/// Explains the gate to the student: what exam, what score, where they stand.
async fn video_access(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<AccessDecision>, ApiError> {
    let video = fetch_video(&state, &id).await?;
    let decision = decide(&state, &video, &user.id, user.role).await?;
    Ok(Json(decision))
}

async fn decide(
    state: &AppState,
    video: &Video,
    user_id: &str,
    role: UserRole,
) -> Result<AccessDecision, ApiError> {
    // Teachers see everything they manage.
    if role == UserRole::Teacher {
        return Ok(AccessDecision {
            can_watch: true,
            required_exam_id: video.required_exam_id.clone(),
            minimum_score: video.minimum_score,
            best_score: None,
        });
    }

    gating::evaluate(state.db(), video, user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to evaluate video access"))
}

async fn fetch_video(state: &AppState, id: &str) -> Result<Video, ApiError> {
    repositories::videos::find_by_id(state.db(), id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load video"))?
        .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))
}
