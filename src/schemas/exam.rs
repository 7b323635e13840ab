use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{ChoiceOption, Exam, Question};
use crate::db::types::QuestionKind;
use crate::services::grading::QuestionSnapshot;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 255))]
    pub(crate) title: String,
    #[validate(length(min = 1, max = 100))]
    pub(crate) subject: String,
    #[validate(range(min = 1, max = 12))]
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<String>,
    #[validate(range(min = 60, max = 14400))]
    pub(crate) duration_seconds: i32,
    #[validate(range(min = 0.0, max = 100.0))]
    pub(crate) passing_score: f64,
    #[validate(range(min = 1, max = 10))]
    pub(crate) max_attempts: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) end_date: OffsetDateTime,
    #[validate(length(min = 1, max = 200), nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1, max = 2000))]
    pub(crate) prompt: String,
    pub(crate) kind: QuestionKind,
    #[serde(default)]
    pub(crate) options: Vec<ChoiceOptionCreate>,
    pub(crate) answer_true: Option<bool>,
    #[validate(range(min = 1, max = 100))]
    pub(crate) points: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct ChoiceOptionCreate {
    #[validate(length(min = 1, max = 500))]
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

impl QuestionCreate {
    /// Shape checks serde cannot express: each kind needs its own answer key.
    pub(crate) fn check_shape(&self) -> Result<(), String> {
        match self.kind {
            QuestionKind::SingleChoice => {
                if self.options.len() < 2 {
                    return Err("Single-choice question needs at least two options".to_string());
                }
                let correct = self.options.iter().filter(|option| option.is_correct).count();
                if correct != 1 {
                    return Err(
                        "Single-choice question needs exactly one correct option".to_string()
                    );
                }
            }
            QuestionKind::TrueFalse => {
                if self.answer_true.is_none() {
                    return Err("True/false question needs answer_true".to_string());
                }
            }
            QuestionKind::FreeText => {}
        }
        Ok(())
    }

    pub(crate) fn to_options(&self) -> Vec<ChoiceOption> {
        self.options
            .iter()
            .map(|option| ChoiceOption { text: option.text.clone(), is_correct: option.is_correct })
            .collect()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[validate(length(min = 1, max = 255))]
    pub(crate) title: Option<String>,
    pub(crate) chapter: Option<String>,
    #[validate(range(min = 60, max = 14400))]
    pub(crate) duration_seconds: Option<i32>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub(crate) passing_score: Option<f64>,
    #[validate(range(min = 1, max = 10))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub(crate) end_date: Option<OffsetDateTime>,
    pub(crate) is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    pub(crate) grade_level: Option<i32>,
    pub(crate) subject: Option<String>,
    /// When true, only active exams whose window is currently open.
    pub(crate) available: Option<bool>,
}

/// Question as a student sees it: the answer key never leaves the server.
#[derive(Debug, Serialize)]
pub(crate) struct RedactedQuestion {
    pub(crate) id: String,
    pub(crate) prompt: String,
    pub(crate) kind: QuestionKind,
    pub(crate) options: Vec<String>,
    pub(crate) points: i32,
}

impl RedactedQuestion {
    pub(crate) fn from_question(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            kind: question.kind,
            options: question.options.0.iter().map(|option| option.text.clone()).collect(),
            points: question.points,
        }
    }

    pub(crate) fn from_snapshot(snapshot: &QuestionSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            prompt: snapshot.prompt.clone(),
            kind: snapshot.kind,
            options: snapshot.options.iter().map(|option| option.text.clone()).collect(),
            points: snapshot.points,
        }
    }
}

/// Full question view for teachers, answer key included.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) position: i32,
    pub(crate) prompt: String,
    pub(crate) kind: QuestionKind,
    pub(crate) options: Vec<ChoiceOption>,
    pub(crate) answer_true: Option<bool>,
    pub(crate) points: i32,
}

impl QuestionResponse {
    pub(crate) fn from_question(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            position: question.position,
            prompt: question.prompt.clone(),
            kind: question.kind,
            options: question.options.0.clone(),
            answer_true: question.answer_true,
            points: question.points,
        }
    }
}

/// Question list on an exam response; which form depends on who is asking.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum QuestionView {
    Full(QuestionResponse),
    Redacted(RedactedQuestion),
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) subject: String,
    pub(crate) grade_level: i32,
    pub(crate) chapter: Option<String>,
    pub(crate) duration_seconds: i32,
    pub(crate) passing_score: f64,
    pub(crate) max_attempts: i32,
    pub(crate) total_points: i32,
    pub(crate) start_date: String,
    pub(crate) end_date: String,
    pub(crate) is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<QuestionView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) student: Option<StudentExamStatus>,
}

/// Per-student augmentation carried on exam listings and detail views.
#[derive(Debug, Serialize)]
pub(crate) struct StudentExamStatus {
    pub(crate) attempts_used: i64,
    pub(crate) remaining_attempts: i64,
    pub(crate) best_score: Option<f64>,
    pub(crate) passed: bool,
    pub(crate) can_take: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) denied_reason: Option<&'static str>,
}

impl ExamResponse {
    pub(crate) fn from_exam(exam: &Exam) -> Self {
        Self {
            id: exam.id.clone(),
            title: exam.title.clone(),
            subject: exam.subject.clone(),
            grade_level: exam.grade_level,
            chapter: exam.chapter.clone(),
            duration_seconds: exam.duration_seconds,
            passing_score: exam.passing_score,
            max_attempts: exam.max_attempts,
            total_points: exam.total_points,
            start_date: format_primitive(exam.start_date),
            end_date: format_primitive(exam.end_date),
            is_active: exam.is_active,
            questions: None,
            student: None,
        }
    }

    pub(crate) fn with_questions(mut self, questions: Vec<QuestionResponse>) -> Self {
        self.questions = Some(questions.into_iter().map(QuestionView::Full).collect());
        self
    }

    pub(crate) fn with_redacted_questions(mut self, questions: Vec<RedactedQuestion>) -> Self {
        self.questions = Some(questions.into_iter().map(QuestionView::Redacted).collect());
        self
    }

    pub(crate) fn with_student_status(mut self, status: StudentExamStatus) -> Self {
        self.student = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, is_correct: bool) -> ChoiceOptionCreate {
        ChoiceOptionCreate { text: text.to_string(), is_correct }
    }

    #[test]
    fn single_choice_requires_exactly_one_correct_option() {
        let mut question = QuestionCreate {
            prompt: "Capital of France?".to_string(),
            kind: QuestionKind::SingleChoice,
            options: vec![option("Paris", true), option("Rome", false)],
            answer_true: None,
            points: 1,
        };
        assert!(question.check_shape().is_ok());

        question.options[1].is_correct = true;
        assert!(question.check_shape().is_err());

        question.options = vec![option("Paris", false), option("Rome", false)];
        assert!(question.check_shape().is_err());

        question.options = vec![option("Paris", true)];
        assert!(question.check_shape().is_err());
    }

    #[test]
    fn true_false_requires_answer_key() {
        let mut question = QuestionCreate {
            prompt: "The sky is blue".to_string(),
            kind: QuestionKind::TrueFalse,
            options: Vec::new(),
            answer_true: None,
            points: 1,
        };
        assert!(question.check_shape().is_err());

        question.answer_true = Some(true);
        assert!(question.check_shape().is_ok());
    }

    #[test]
    fn free_text_has_no_shape_requirements() {
        let question = QuestionCreate {
            prompt: "Explain photosynthesis".to_string(),
            kind: QuestionKind::FreeText,
            options: Vec::new(),
            answer_true: None,
            points: 5,
        };
        assert!(question.check_shape().is_ok());
    }

    #[test]
    fn redacted_question_drops_the_answer_key() {
        let snapshot = QuestionSnapshot {
            id: "q1".to_string(),
            prompt: "Capital of France?".to_string(),
            kind: QuestionKind::SingleChoice,
            options: vec![
                ChoiceOption { text: "Paris".to_string(), is_correct: true },
                ChoiceOption { text: "Rome".to_string(), is_correct: false },
            ],
            answer_true: None,
            points: 1,
        };

        let redacted = RedactedQuestion::from_snapshot(&snapshot);
        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains("is_correct"));
        assert!(!json.contains("answer_true"));
        assert_eq!(redacted.options, vec!["Paris".to_string(), "Rome".to_string()]);
    }

    #[test]
    fn student_exam_view_carries_questions_without_the_answer_key() {
        use crate::core::time::primitive_now_utc;
        use sqlx::types::Json;

        let now = primitive_now_utc();
        let exam = Exam {
            id: "exam-1".to_string(),
            title: "Algebra Midterm".to_string(),
            subject: "math".to_string(),
            grade_level: 9,
            chapter: None,
            duration_seconds: 1800,
            passing_score: 70.0,
            max_attempts: 3,
            total_points: 1,
            start_date: now,
            end_date: now,
            is_active: true,
            created_by: "tea-1".to_string(),
            created_at: now,
            updated_at: now,
        };
        let question = Question {
            id: "q1".to_string(),
            exam_id: "exam-1".to_string(),
            position: 0,
            prompt: "Capital of France?".to_string(),
            kind: QuestionKind::SingleChoice,
            options: Json(vec![
                ChoiceOption { text: "Paris".to_string(), is_correct: true },
                ChoiceOption { text: "Rome".to_string(), is_correct: false },
            ]),
            answer_true: None,
            points: 1,
            created_at: now,
        };

        let response = ExamResponse::from_exam(&exam)
            .with_redacted_questions(vec![RedactedQuestion::from_question(&question)]);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["questions"][0]["options"], serde_json::json!(["Paris", "Rome"]));
        assert!(json["questions"][0].get("is_correct").is_none());
        assert!(json["questions"][0].get("answer_true").is_none());

        // The teacher view keeps the full key.
        let full = ExamResponse::from_exam(&exam)
            .with_questions(vec![QuestionResponse::from_question(&question)]);
        let json = serde_json::to_value(&full).unwrap();
        assert_eq!(json["questions"][0]["options"][0]["is_correct"], serde_json::json!(true));
    }
}
