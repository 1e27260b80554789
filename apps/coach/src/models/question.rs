use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    Coding,
    OpenText,
}

/// A question as issued by the Question Service. Never mutated after receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub kind: QuestionKind,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_solution: Option<String>,
    pub difficulty: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Question {
    pub fn open_text(id: impl Into<String>, prompt: impl Into<String>, difficulty: u8) -> Self {
        Self {
            id: id.into(),
            kind: QuestionKind::OpenText,
            prompt: prompt.into(),
            choices: None,
            correct_index: None,
            reference_solution: None,
            difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
            language: None,
        }
    }

    /// Clamps the difficulty into 1..=10. Applied once, on receipt.
    pub fn normalized(mut self) -> Self {
        self.difficulty = self.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        self
    }

    /// A multiple-choice question with a known answer key is scored.
    pub fn is_scored(&self) -> bool {
        self.kind == QuestionKind::MultipleChoice && self.correct_index.is_some()
    }

    pub fn choice_text(&self, index: usize) -> Option<&str> {
        self.choices
            .as_ref()
            .and_then(|c| c.get(index))
            .map(String::as_str)
    }
}

/// Lighter question shape used only by the diagnostic quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub difficulty: u8,
}

/// Exactly one kind of answer per submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerPayload {
    Choice(usize),
    Code(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    pub question_id: String,
    pub answer: AnswerPayload,
    pub submitted_at: DateTime<Utc>,
}

impl AnswerSubmission {
    pub fn new(question_id: impl Into<String>, answer: AnswerPayload) -> Self {
        Self {
            question_id: question_id.into(),
            answer,
            submitted_at: Utc::now(),
        }
    }
}
