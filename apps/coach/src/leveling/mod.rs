//! Leveling: pure classification of candidate proficiency.
//!
//! Two scales coexist and are deliberately kept as separate types:
//! - `LiveLevel` (four tiers) is produced from live interview performance.
//! - `QuizLevel` (three tiers) is produced by the diagnostic quiz in `quiz`.
//!
//! The only bridge between them is `impl From<QuizLevel> for LiveLevel`, used
//! when a quiz result seeds the starting level of a live interview.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod handlers;
pub mod quiz;

// ────────────────────────────────────────────────────────────────────────────
// Level scales
// ────────────────────────────────────────────────────────────────────────────

/// Live-performance level. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveLevel {
    Simple,
    Moderate,
    Advanced,
    Outstanding,
}

/// Diagnostic-quiz level. Has no `outstanding` tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizLevel {
    Simple,
    Moderate,
    Advanced,
}

impl LiveLevel {
    pub const ALL: [LiveLevel; 4] = [
        LiveLevel::Simple,
        LiveLevel::Moderate,
        LiveLevel::Advanced,
        LiveLevel::Outstanding,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LiveLevel::Simple => "simple",
            LiveLevel::Moderate => "moderate",
            LiveLevel::Advanced => "advanced",
            LiveLevel::Outstanding => "outstanding",
        }
    }

    /// Human-facing name used in feedback text.
    pub fn display_name(&self) -> &'static str {
        match self {
            LiveLevel::Simple => "Simple",
            LiveLevel::Moderate => "Moderate",
            LiveLevel::Advanced => "Advanced",
            LiveLevel::Outstanding => "Outstanding",
        }
    }
}

impl QuizLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizLevel::Simple => "simple",
            QuizLevel::Moderate => "moderate",
            QuizLevel::Advanced => "advanced",
        }
    }
}

/// Seeds a live session from a quiz result.
///
/// Quiz `advanced` maps to live `advanced`, never `outstanding`: the quiz has
/// no evidence for the top tier.
impl From<QuizLevel> for LiveLevel {
    fn from(level: QuizLevel) -> Self {
        match level {
            QuizLevel::Simple => LiveLevel::Simple,
            QuizLevel::Moderate => LiveLevel::Moderate,
            QuizLevel::Advanced => LiveLevel::Advanced,
        }
    }
}

impl fmt::Display for LiveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for QuizLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LevelingError {
    #[error("cannot classify a session with no recorded answers")]
    EmptySession,

    #[error("unknown level: {0}")]
    UnknownLevel(String),
}

impl FromStr for LiveLevel {
    type Err = LevelingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(LiveLevel::Simple),
            "moderate" => Ok(LiveLevel::Moderate),
            "advanced" => Ok(LiveLevel::Advanced),
            "outstanding" => Ok(LiveLevel::Outstanding),
            other => Err(LevelingError::UnknownLevel(other.to_string())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Performance classification
// ────────────────────────────────────────────────────────────────────────────

/// (min accuracy, min average difficulty, level), evaluated top-down.
const PERFORMANCE_TIERS: &[(f64, f64, LiveLevel)] = &[
    (0.8, 7.0, LiveLevel::Outstanding),
    (0.6, 5.0, LiveLevel::Advanced),
    (0.4, 3.0, LiveLevel::Moderate),
];

/// Classifies aggregated live performance.
///
/// Both accuracy and average difficulty must clear a tier's thresholds; a
/// perfect run on easy questions stays low. The first satisfied tier wins.
pub fn classify_from_performance(
    correct: u32,
    total: u32,
    avg_difficulty: f64,
) -> Result<LiveLevel, LevelingError> {
    if total == 0 {
        return Err(LevelingError::EmptySession);
    }
    let accuracy = correct as f64 / total as f64;
    Ok(classify_accuracy(accuracy, avg_difficulty))
}

fn classify_accuracy(accuracy: f64, avg_difficulty: f64) -> LiveLevel {
    PERFORMANCE_TIERS
        .iter()
        .find(|(min_accuracy, min_difficulty, _)| {
            accuracy >= *min_accuracy && avg_difficulty >= *min_difficulty
        })
        .map(|(_, _, level)| *level)
        .unwrap_or(LiveLevel::Simple)
}

// ────────────────────────────────────────────────────────────────────────────
// Difficulty ranges
// ────────────────────────────────────────────────────────────────────────────

/// Inclusive question-difficulty band served at a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyRange {
    pub min: u8,
    pub max: u8,
}

impl DifficultyRange {
    pub fn contains(&self, difficulty: u8) -> bool {
        (self.min..=self.max).contains(&difficulty)
    }

    pub fn midpoint(&self) -> u8 {
        (self.min + self.max) / 2
    }
}

/// Neighbouring ranges overlap so a borderline candidate sees continuity
/// across a level change.
pub fn difficulty_range(level: LiveLevel) -> DifficultyRange {
    match level {
        LiveLevel::Simple => DifficultyRange { min: 1, max: 3 },
        LiveLevel::Moderate => DifficultyRange { min: 2, max: 5 },
        LiveLevel::Advanced => DifficultyRange { min: 4, max: 7 },
        LiveLevel::Outstanding => DifficultyRange { min: 6, max: 10 },
    }
}

/// Range lookup for a level arriving as free text. Unknown labels get the
/// moderate range.
pub fn difficulty_range_for_label(label: &str) -> DifficultyRange {
    let level = label.parse().unwrap_or(LiveLevel::Moderate);
    difficulty_range(level)
}
