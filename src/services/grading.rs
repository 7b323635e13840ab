use serde::{Deserialize, Serialize};

use crate::db::models::{ChoiceOption, Question};
use crate::db::types::QuestionKind;

/// A submitted answer, tagged by the kind of question it targets. A kind
/// mismatch against the actual question grades as incorrect, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub(crate) enum AnswerValue {
    Choice(String),
    Boolean(bool),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnswerPayload {
    pub(crate) question_id: String,
    #[serde(flatten)]
    pub(crate) value: AnswerValue,
}

/// Question as frozen into the attempt session at start time. Grading always
/// runs against this snapshot, so teacher edits mid-window cannot change what
/// an in-flight attempt is graded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionSnapshot {
    pub(crate) id: String,
    pub(crate) prompt: String,
    pub(crate) kind: QuestionKind,
    pub(crate) options: Vec<ChoiceOption>,
    pub(crate) answer_true: Option<bool>,
    pub(crate) points: i32,
}

impl QuestionSnapshot {
    pub(crate) fn from_question(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            kind: question.kind,
            options: question.options.0.clone(),
            answer_true: question.answer_true,
            points: question.points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AnswerRecord {
    pub(crate) question_id: String,
    pub(crate) submitted: Option<AnswerValue>,
    pub(crate) is_correct: bool,
    pub(crate) points_awarded: i32,
    /// Free-text answers are never machine-graded; they score zero and wait
    /// for manual review.
    pub(crate) needs_review: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradeOutcome {
    pub(crate) records: Vec<AnswerRecord>,
    pub(crate) score: i32,
    pub(crate) total_points: i32,
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) correct_count: usize,
}

/// Grades a snapshot against submitted answers. Pure and deterministic:
/// identical inputs yield identical output, so a retried submit can re-grade
/// safely. Missing answers and kind mismatches score zero without failing.
pub(crate) fn grade(
    questions: &[QuestionSnapshot],
    passing_score: f64,
    answers: &[AnswerPayload],
) -> GradeOutcome {
    let mut records = Vec::with_capacity(questions.len());
    let mut score = 0;
    let mut total_points = 0;
    let mut correct_count = 0;

    for question in questions {
        total_points += question.points;

        // First submitted answer for the question wins; later duplicates are
        // ignored.
        let submitted =
            answers.iter().find(|answer| answer.question_id == question.id).map(|a| &a.value);

        let record = grade_question(question, submitted);
        if record.is_correct {
            score += record.points_awarded;
            correct_count += 1;
        }
        records.push(record);
    }

    let percentage = percentage_of(score, total_points);
    let passed = percentage >= passing_score;

    GradeOutcome { records, score, total_points, percentage, passed, correct_count }
}

fn grade_question(question: &QuestionSnapshot, submitted: Option<&AnswerValue>) -> AnswerRecord {
    let (is_correct, needs_review) = match (question.kind, submitted) {
        (QuestionKind::FreeText, _) => (false, true),
        (_, None) => (false, false),
        (QuestionKind::SingleChoice, Some(AnswerValue::Choice(text))) => {
            let correct = question
                .options
                .iter()
                .find(|option| option.is_correct)
                .is_some_and(|option| option.text == *text);
            (correct, false)
        }
        (QuestionKind::TrueFalse, Some(AnswerValue::Boolean(value))) => {
            (question.answer_true == Some(*value), false)
        }
        // Answer kind does not match the question kind.
        (_, Some(_)) => (false, false),
    };

    AnswerRecord {
        question_id: question.id.clone(),
        submitted: submitted.cloned(),
        is_correct,
        points_awarded: if is_correct { question.points } else { 0 },
        needs_review,
    }
}

/// Percentage in [0, 100], defined as 0 when there are no points to earn.
pub(crate) fn percentage_of(score: i32, total_points: i32) -> f64 {
    if total_points <= 0 {
        return 0.0;
    }
    let raw = f64::from(score) / f64::from(total_points) * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_choice(id: &str, correct: &str, wrong: &str, points: i32) -> QuestionSnapshot {
        QuestionSnapshot {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            kind: QuestionKind::SingleChoice,
            options: vec![
                ChoiceOption { text: correct.to_string(), is_correct: true },
                ChoiceOption { text: wrong.to_string(), is_correct: false },
            ],
            answer_true: None,
            points,
        }
    }

    fn true_false(id: &str, answer: bool, points: i32) -> QuestionSnapshot {
        QuestionSnapshot {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            kind: QuestionKind::TrueFalse,
            options: Vec::new(),
            answer_true: Some(answer),
            points,
        }
    }

    fn free_text(id: &str, points: i32) -> QuestionSnapshot {
        QuestionSnapshot {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            kind: QuestionKind::FreeText,
            options: Vec::new(),
            answer_true: None,
            points,
        }
    }

    fn choice(question_id: &str, text: &str) -> AnswerPayload {
        AnswerPayload {
            question_id: question_id.to_string(),
            value: AnswerValue::Choice(text.to_string()),
        }
    }

    #[test]
    fn all_correct_scores_full_marks() {
        let questions = vec![single_choice("q1", "Paris", "Rome", 1), true_false("q2", true, 1)];
        let answers = vec![
            choice("q1", "Paris"),
            AnswerPayload { question_id: "q2".to_string(), value: AnswerValue::Boolean(true) },
        ];

        let outcome = grade(&questions, 70.0, &answers);

        assert_eq!(outcome.score, 2);
        assert_eq!(outcome.total_points, 2);
        assert_eq!(outcome.percentage, 100.0);
        assert!(outcome.passed);
        assert_eq!(outcome.correct_count, 2);
    }

    #[test]
    fn missing_answer_scores_zero_without_error() {
        let questions =
            vec![single_choice("q1", "Paris", "Rome", 1), single_choice("q2", "Oxygen", "Gold", 1)];
        let answers = vec![choice("q1", "Paris")];

        let outcome = grade(&questions, 70.0, &answers);

        assert_eq!(outcome.score, 1);
        assert_eq!(outcome.percentage, 50.0);
        assert!(!outcome.passed);
        let unanswered = &outcome.records[1];
        assert!(unanswered.submitted.is_none());
        assert!(!unanswered.is_correct);
        assert_eq!(unanswered.points_awarded, 0);
    }

    #[test]
    fn wrong_choice_scores_zero() {
        let questions = vec![single_choice("q1", "Paris", "Rome", 3)];
        let outcome = grade(&questions, 50.0, &[choice("q1", "Rome")]);

        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.percentage, 0.0);
        assert!(!outcome.passed);
    }

    #[test]
    fn kind_mismatch_is_incorrect_not_an_error() {
        let questions = vec![true_false("q1", true, 2)];
        let outcome = grade(&questions, 50.0, &[choice("q1", "true")]);

        assert_eq!(outcome.score, 0);
        assert!(!outcome.records[0].is_correct);
    }

    #[test]
    fn free_text_scores_zero_and_needs_review() {
        let questions = vec![free_text("q1", 5), true_false("q2", false, 5)];
        let answers = vec![
            AnswerPayload {
                question_id: "q1".to_string(),
                value: AnswerValue::Text("an essay".to_string()),
            },
            AnswerPayload { question_id: "q2".to_string(), value: AnswerValue::Boolean(false) },
        ];

        let outcome = grade(&questions, 50.0, &answers);

        assert!(outcome.records[0].needs_review);
        assert_eq!(outcome.records[0].points_awarded, 0);
        assert_eq!(outcome.score, 5);
        assert_eq!(outcome.percentage, 50.0);
        assert!(outcome.passed);
    }

    #[test]
    fn duplicate_answers_use_the_first() {
        let questions = vec![single_choice("q1", "Paris", "Rome", 1)];
        let answers = vec![choice("q1", "Rome"), choice("q1", "Paris")];

        let outcome = grade(&questions, 50.0, &answers);
        assert_eq!(outcome.score, 0);
    }

    #[test]
    fn zero_total_points_defines_percentage_as_zero() {
        let outcome = grade(&[], 70.0, &[]);
        assert_eq!(outcome.total_points, 0);
        assert_eq!(outcome.percentage, 0.0);
        assert!(!outcome.passed);
    }

    #[test]
    fn grading_is_deterministic() {
        let questions = vec![
            single_choice("q1", "Paris", "Rome", 2),
            true_false("q2", true, 3),
            free_text("q3", 4),
        ];
        let answers = vec![
            choice("q1", "Paris"),
            AnswerPayload { question_id: "q2".to_string(), value: AnswerValue::Boolean(false) },
        ];

        let first = grade(&questions, 40.0, &answers);
        let second = grade(&questions, 40.0, &answers);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first.records).unwrap(),
            serde_json::to_vec(&second.records).unwrap()
        );
    }

    #[test]
    fn percentage_stays_in_bounds_and_passed_is_consistent() {
        let cases = [(0, 3, 60.0), (1, 3, 60.0), (2, 3, 60.0), (3, 3, 60.0)];
        for (correct, total, passing) in cases {
            let questions: Vec<QuestionSnapshot> = (0..total)
                .map(|idx| single_choice(&format!("q{idx}"), "yes", "no", 1))
                .collect();
            let answers: Vec<AnswerPayload> =
                (0..correct).map(|idx| choice(&format!("q{idx}"), "yes")).collect();

            let outcome = grade(&questions, passing, &answers);
            assert!((0.0..=100.0).contains(&outcome.percentage));
            assert_eq!(outcome.passed, outcome.percentage >= passing);
        }
    }

    #[test]
    fn answer_payload_serializes_with_kind_tag() {
        let payload = choice("q1", "Paris");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"question_id": "q1", "kind": "choice", "value": "Paris"})
        );

        let parsed: AnswerPayload =
            serde_json::from_value(serde_json::json!({"question_id": "q2", "kind": "boolean", "value": true}))
                .unwrap();
        assert_eq!(parsed.value, AnswerValue::Boolean(true));
    }
}
