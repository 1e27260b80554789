//! Diagnostic quiz scoring: recommends a starting `QuizLevel`.
//!
//! Uses its own formula and three-tier scale; see `classify_from_quiz`.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::leveling::QuizLevel;
use crate::models::question::AssessmentQuestion;

/// (min weighted score, min average difficulty, level), evaluated top-down.
const QUIZ_TIERS: &[(f64, f64, QuizLevel)] = &[
    (0.6, 2.5, QuizLevel::Advanced),
    (0.4, 1.5, QuizLevel::Moderate),
];

/// Intermediate figures, exposed so callers can show the candidate how the
/// level was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub correct_answers: u32,
    pub answered: u32,
    pub question_count: u32,
    pub accuracy: f64,
    pub avg_difficulty: f64,
    pub weighted_score: f64,
    pub level: QuizLevel,
}

/// Scores a quiz and classifies it.
///
/// Unanswered questions contribute nothing to the sums but still count in the
/// denominators, so they weigh against the candidate.
pub fn score_quiz(questions: &[AssessmentQuestion], answers: &HashMap<String, usize>) -> QuizScore {
    let question_count = questions.len() as u32;

    let mut answered = 0u32;
    let mut correct_answers = 0u32;
    let mut total_score = 0.0_f64;
    let mut total_difficulty = 0.0_f64;

    for question in questions {
        let Some(&selected) = answers.get(&question.id) else {
            continue;
        };
        answered += 1;
        total_difficulty += question.difficulty as f64;
        if selected == question.correct_index {
            correct_answers += 1;
            total_score += question.difficulty as f64;
        }
    }

    let (accuracy, avg_difficulty) = if question_count == 0 {
        (0.0, 0.0)
    } else {
        (
            correct_answers as f64 / question_count as f64,
            total_difficulty / question_count as f64,
        )
    };

    let weighted_score = if total_difficulty > 0.0 {
        (total_score / total_difficulty) * accuracy
    } else {
        0.0
    };

    let level = QUIZ_TIERS
        .iter()
        .find(|(min_score, min_difficulty, _)| {
            weighted_score >= *min_score && avg_difficulty >= *min_difficulty
        })
        .map(|(_, _, level)| *level)
        .unwrap_or(QuizLevel::Simple);

    QuizScore {
        correct_answers,
        answered,
        question_count,
        accuracy,
        avg_difficulty,
        weighted_score,
        level,
    }
}

pub fn classify_from_quiz(
    questions: &[AssessmentQuestion],
    answers: &HashMap<String, usize>,
) -> QuizLevel {
    score_quiz(questions, answers).level
}

// ────────────────────────────────────────────────────────────────────────────
// SelfAssessment: one quiz run
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum AssessmentError {
    #[error("unknown question id: {0}")]
    UnknownQuestion(String),

    #[error("option {index} out of range for question {question_id} ({options} options)")]
    OptionOutOfRange {
        question_id: String,
        index: usize,
        options: usize,
    },

    #[error("{remaining} question(s) still unanswered")]
    Incomplete { remaining: usize },
}

/// One diagnostic quiz run. Answers may be changed until the run is scored.
#[derive(Debug, Clone)]
pub struct SelfAssessment {
    questions: Vec<AssessmentQuestion>,
    answers: HashMap<String, usize>,
}

impl SelfAssessment {
    pub fn new(questions: Vec<AssessmentQuestion>) -> Self {
        Self {
            questions,
            answers: HashMap::new(),
        }
    }

    pub fn questions(&self) -> &[AssessmentQuestion] {
        &self.questions
    }

    pub fn answer(&mut self, question_id: &str, index: usize) -> Result<(), AssessmentError> {
        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| AssessmentError::UnknownQuestion(question_id.to_string()))?;

        if index >= question.options.len() {
            return Err(AssessmentError::OptionOutOfRange {
                question_id: question_id.to_string(),
                index,
                options: question.options.len(),
            });
        }

        self.answers.insert(question.id.clone(), index);
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| !self.answers.contains_key(&q.id))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Scores the run. Every question must be answered first.
    pub fn finish(&self) -> Result<QuizScore, AssessmentError> {
        let remaining = self.remaining();
        if remaining > 0 {
            return Err(AssessmentError::Incomplete { remaining });
        }
        Ok(score_quiz(&self.questions, &self.answers))
    }
}
