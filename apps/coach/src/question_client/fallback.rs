//! Local substitutes for Question Service content. Used whenever a call fails
//! so an interview or calibration never stalls on the backend.

use uuid::Uuid;

use crate::leveling::{difficulty_range, LiveLevel};
use crate::models::question::{AssessmentQuestion, Question};

pub const LOCAL_SESSION_PREFIX: &str = "local-";

pub const FALLBACK_QUESTION_ID: &str = "fallback-open";

const FALLBACK_QUESTION_PROMPT: &str =
    "Describe a challenging problem you solved recently and walk me through your approach.";

/// `local-` followed by 32 lowercase hex characters.
pub fn fallback_session_id() -> String {
    format!("{LOCAL_SESSION_PREFIX}{}", Uuid::new_v4().simple())
}

pub fn is_local_session(session_id: &str) -> bool {
    session_id.starts_with(LOCAL_SESSION_PREFIX)
}

/// Open-text question pitched at the middle of `level`'s difficulty range.
pub fn fallback_question(level: LiveLevel) -> Question {
    Question::open_text(
        FALLBACK_QUESTION_ID,
        FALLBACK_QUESTION_PROMPT,
        difficulty_range(level).midpoint(),
    )
}

/// Role-agnostic diagnostic quiz, ordered easy to hard.
pub fn fallback_assessment() -> Vec<AssessmentQuestion> {
    let items: [(&str, &str, [&str; 4], usize, u8); 5] = [
        (
            "fb-1",
            "Which data structure gives constant-time lookup by key on average?",
            ["Linked list", "Hash map", "Binary heap", "Stack"],
            1,
            1,
        ),
        (
            "fb-2",
            "What does a version control system's merge conflict indicate?",
            [
                "The repository is corrupted",
                "Two changes touched the same lines",
                "A branch was deleted",
                "The remote is offline",
            ],
            1,
            2,
        ),
        (
            "fb-3",
            "What is the worst-case time complexity of binary search?",
            ["O(1)", "O(n)", "O(log n)", "O(n log n)"],
            2,
            2,
        ),
        (
            "fb-4",
            "Which HTTP status code signals that the client should retry later because of rate limiting?",
            ["301", "404", "429", "500"],
            2,
            3,
        ),
        (
            "fb-5",
            "Two threads increment a shared counter without synchronization. What is the likely outcome?",
            [
                "The counter is always correct",
                "The program fails to compile in every language",
                "Updates can be lost",
                "The counter doubles",
            ],
            2,
            4,
        ),
    ];

    items
        .into_iter()
        .map(|(id, question, options, correct_index, difficulty)| AssessmentQuestion {
            id: id.to_string(),
            question: question.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_index,
            difficulty,
        })
        .collect()
}
