use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;

use crate::db::models::{Attempt, Video};
use crate::repositories;

/// Gating rule attached to a video. Absent rule means the video is open to
/// everyone.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GatingRule<'a> {
    pub(crate) required_exam_id: &'a str,
    pub(crate) minimum_score: f64,
}

impl<'a> GatingRule<'a> {
    pub(crate) fn of_video(video: &'a Video) -> Option<Self> {
        let required_exam_id = video.required_exam_id.as_deref()?;
        Some(Self { required_exam_id, minimum_score: video.minimum_score.unwrap_or(0.0) })
    }
}

/// Decides whether the best ledger entry satisfies a minimum-score rule: the
/// attempt must have passed the exam and reach the rule's own minimum, which
/// may sit above or below the exam's passing score. Evaluated on every read
/// against the current ledger; access can only widen over time because
/// attempts are immutable and `best` is monotone.
pub(crate) fn rule_satisfied(best: Option<&Attempt>, minimum_score: f64) -> bool {
    best.is_some_and(|attempt| attempt.passed && attempt.percentage >= minimum_score)
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AccessDecision {
    pub(crate) can_watch: bool,
    pub(crate) required_exam_id: Option<String>,
    pub(crate) minimum_score: Option<f64>,
    pub(crate) best_score: Option<f64>,
}

/// Batch form of [`evaluate`] for video listings: one ledger query for the
/// student's passing bests, then a pure decision per video. Must agree with
/// repeated single calls.
pub(crate) async fn evaluate_batch(
    pool: &PgPool,
    videos: &[Video],
    student_id: &str,
) -> Result<Vec<AccessDecision>, sqlx::Error> {
    let needs_ledger = videos.iter().any(|video| video.required_exam_id.is_some());
    let passing_best: HashMap<String, f64> = if needs_ledger {
        repositories::attempts::passing_best_by_student(pool, student_id)
            .await?
            .into_iter()
            .map(|row| (row.exam_id, row.best_percentage))
            .collect()
    } else {
        HashMap::new()
    };

    Ok(videos.iter().map(|video| decide_from_bests(video, &passing_best)).collect())
}

fn decide_from_bests(video: &Video, passing_best: &HashMap<String, f64>) -> AccessDecision {
    let Some(rule) = GatingRule::of_video(video) else {
        return AccessDecision {
            can_watch: true,
            required_exam_id: None,
            minimum_score: None,
            best_score: None,
        };
    };

    let best = passing_best.get(rule.required_exam_id).copied();
    AccessDecision {
        can_watch: best.is_some_and(|percentage| percentage >= rule.minimum_score),
        required_exam_id: Some(rule.required_exam_id.to_string()),
        minimum_score: Some(rule.minimum_score),
        best_score: best,
    }
}

pub(crate) async fn evaluate(
    pool: &PgPool,
    video: &Video,
    student_id: &str,
) -> Result<AccessDecision, sqlx::Error> {
    let Some(rule) = GatingRule::of_video(video) else {
        return Ok(AccessDecision {
            can_watch: true,
            required_exam_id: None,
            minimum_score: None,
            best_score: None,
        });
    };

    let best =
        repositories::attempts::best_for_student(pool, student_id, rule.required_exam_id).await?;

    Ok(AccessDecision {
        can_watch: rule_satisfied(best.as_ref(), rule.minimum_score),
        required_exam_id: Some(rule.required_exam_id.to_string()),
        minimum_score: Some(rule.minimum_score),
        // Only passing attempts count toward the gate, so only they are
        // reported against it.
        best_score: best.filter(|attempt| attempt.passed).map(|attempt| attempt.percentage),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use sqlx::types::Json;

    fn attempt_with_percentage(percentage: f64, passed: bool) -> Attempt {
        let now = primitive_now_utc();
        Attempt {
            id: "att-1".to_string(),
            exam_id: "exam-1".to_string(),
            student_id: "stu-1".to_string(),
            attempt_number: 1,
            answers: Json(Vec::new()),
            score: 0,
            total_points: 10,
            percentage,
            passed,
            time_spent_seconds: 60,
            auto_submitted: false,
            started_at: now,
            submitted_at: now,
        }
    }

    #[test]
    fn no_attempts_means_locked() {
        assert!(!rule_satisfied(None, 70.0));
    }

    #[test]
    fn meeting_threshold_exactly_unlocks() {
        let best = attempt_with_percentage(70.0, true);
        assert!(rule_satisfied(Some(&best), 70.0));
    }

    #[test]
    fn failed_attempt_never_unlocks_even_above_threshold() {
        // 60% beats a 50% rule minimum, but the attempt did not pass the
        // exam, so the gate stays shut.
        let best = attempt_with_percentage(60.0, false);
        assert!(!rule_satisfied(Some(&best), 50.0));
    }

    #[test]
    fn passing_below_rule_minimum_stays_locked_until_a_better_attempt() {
        // Rule minimum 80 sits above the exam's own passing score: a 75%
        // pass is not enough, a later 85% pass is.
        let below = attempt_with_percentage(75.0, true);
        assert!(!rule_satisfied(Some(&below), 80.0));

        let above = attempt_with_percentage(85.0, true);
        assert!(rule_satisfied(Some(&above), 80.0));
    }

    #[test]
    fn ungated_video_is_open() {
        let now = primitive_now_utc();
        let video = Video {
            id: "vid-1".to_string(),
            title: "Intro".to_string(),
            subject: "math".to_string(),
            grade_level: 9,
            chapter: None,
            url: "https://example.invalid/v/1".to_string(),
            required_exam_id: None,
            minimum_score: None,
            created_by: "tea-1".to_string(),
            created_at: now,
        };
        assert!(GatingRule::of_video(&video).is_none());
    }

    #[test]
    fn batch_decision_agrees_with_the_single_rule() {
        let now = primitive_now_utc();
        let gated = Video {
            id: "vid-1".to_string(),
            title: "Advanced".to_string(),
            subject: "math".to_string(),
            grade_level: 9,
            chapter: None,
            url: "https://example.invalid/v/1".to_string(),
            required_exam_id: Some("exam-1".to_string()),
            minimum_score: Some(80.0),
            created_by: "tea-1".to_string(),
            created_at: now,
        };
        let open = Video { id: "vid-2".to_string(), required_exam_id: None, minimum_score: None, ..gated.clone() };

        let mut passing_best = HashMap::new();
        passing_best.insert("exam-1".to_string(), 85.0);

        let unlocked = decide_from_bests(&gated, &passing_best);
        assert!(unlocked.can_watch);
        assert_eq!(unlocked.best_score, Some(85.0));
        assert!(unlocked.can_watch == rule_satisfied(Some(&attempt_with_percentage(85.0, true)), 80.0));

        let locked = decide_from_bests(&gated, &HashMap::new());
        assert!(!locked.can_watch);
        assert_eq!(locked.best_score, None);

        assert!(decide_from_bests(&open, &HashMap::new()).can_watch);
    }

    #[test]
    fn missing_minimum_score_defaults_to_zero() {
        let now = primitive_now_utc();
        let video = Video {
            id: "vid-1".to_string(),
            title: "Intro".to_string(),
            subject: "math".to_string(),
            grade_level: 9,
            chapter: None,
            url: "https://example.invalid/v/1".to_string(),
            required_exam_id: Some("exam-1".to_string()),
            minimum_score: None,
            created_by: "tea-1".to_string(),
            created_at: now,
        };
        let rule = GatingRule::of_video(&video).unwrap();
        assert_eq!(rule.minimum_score, 0.0);
        // Still requires at least one ledger entry for the exam.
        assert!(!rule_satisfied(None, rule.minimum_score));
    }
}
