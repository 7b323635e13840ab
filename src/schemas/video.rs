use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Video;
use crate::services::gating::AccessDecision;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct VideoCreate {
    #[validate(length(min = 1, max = 255))]
    pub(crate) title: String,
    #[validate(length(min = 1, max = 100))]
    pub(crate) subject: String,
    #[validate(range(min = 1, max = 12))]
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<String>,
    #[validate(url)]
    pub(crate) url: String,
    pub(crate) required_exam_id: Option<String>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub(crate) minimum_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoListQuery {
    pub(crate) grade_level: Option<i32>,
    pub(crate) subject: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VideoResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<String>,
    /// Omitted while the video is locked for the requesting student.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) url: Option<String>,
    pub(crate) required_exam_id: Option<String>,
    pub(crate) minimum_score: Option<f64>,
    pub(crate) can_watch: bool,
    pub(crate) created_at: String,
}

impl VideoResponse {
    pub(crate) fn from_video(video: &Video, decision: &AccessDecision) -> Self {
        Self {
            id: video.id.clone(),
            title: video.title.clone(),
            subject: video.subject.clone(),
            grade_level: video.grade_level,
            chapter: video.chapter.clone(),
            url: decision.can_watch.then(|| video.url.clone()),
            required_exam_id: video.required_exam_id.clone(),
            minimum_score: video.minimum_score,
            can_watch: decision.can_watch,
            created_at: format_primitive(video.created_at),
        }
    }
}
