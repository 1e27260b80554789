//! PerformanceTracker: per-question outcomes during a live interview, plus
//! the durable level/history that survives across interviews.
//!
//! The tracker is the only writer of a user's current level. It loads the
//! profile once, and writes it back after every finalized session.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::leveling::{classify_from_performance, LevelingError, LiveLevel};
use crate::models::question::Question;
use crate::performance::feedback::{generate_feedback, percent};
use crate::performance::store::{ProfileStore, StoreError, StoredProfile};

/// Number of history entries surfaced in stats and used for recent accuracy.
pub const RECENT_WINDOW: usize = 5;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Leveling(#[from] LevelingError),

    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),
}

// ────────────────────────────────────────────────────────────────────────────
// Data
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub question_id: String,
    pub difficulty: u8,
    pub correct: bool,
    pub time_spent_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSession {
    pub correct: u32,
    pub total: u32,
    pub average_difficulty: f64,
    pub records: Vec<PerformanceRecord>,
    pub started_at: DateTime<Utc>,
}

impl PerformanceSession {
    pub fn new() -> Self {
        Self {
            correct: 0,
            total: 0,
            average_difficulty: 0.0,
            records: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn push(&mut self, record: PerformanceRecord) {
        self.total += 1;
        if record.correct {
            self.correct += 1;
        }
        self.records.push(record);
        // Mean over every recorded difficulty, not an incremental blend.
        let sum: u32 = self.records.iter().map(|r| r.difficulty as u32).sum();
        self.average_difficulty = sum as f64 / self.records.len() as f64;
    }
}

impl Default for PerformanceSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryEntry {
    pub session: PerformanceSession,
    pub level: LiveLevel,
    pub level_changed: bool,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub new_level: LiveLevel,
    pub previous_level: LiveLevel,
    pub level_changed: bool,
    pub feedback: String,
    pub correct: u32,
    pub total: u32,
    /// False when the profile could not be written; the in-memory state is
    /// still updated.
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    Completed(SessionSummary),
    /// The session had no recorded answers; nothing was appended or written.
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub total_sessions: usize,
    pub overall_accuracy: u32,
    pub level_histogram: BTreeMap<LiveLevel, usize>,
    pub current_level: LiveLevel,
    pub recent_sessions: Vec<SessionHistoryEntry>,
}

// ────────────────────────────────────────────────────────────────────────────
// Tracker
// ────────────────────────────────────────────────────────────────────────────

pub struct PerformanceTracker {
    user_id: String,
    store: Arc<dyn ProfileStore>,
    profile: StoredProfile,
    session: Option<PerformanceSession>,
}

impl PerformanceTracker {
    /// Reads the user's profile once. A user with no profile starts at
    /// `simple` with empty history.
    pub async fn load(store: Arc<dyn ProfileStore>, user_id: &str) -> Result<Self, StoreError> {
        let profile = store.load(user_id).await?.unwrap_or_default();
        info!(
            "Loaded coaching profile for {user_id}: level={}, sessions={}",
            profile.current_level,
            profile.history.len()
        );
        Ok(Self {
            user_id: user_id.to_string(),
            store,
            profile,
            session: None,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn current_level(&self) -> LiveLevel {
        self.profile.current_level
    }

    pub fn history(&self) -> &[SessionHistoryEntry] {
        &self.profile.history
    }

    pub fn session(&self) -> Option<&PerformanceSession> {
        self.session.as_ref()
    }

    pub fn has_active_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn start_session(&mut self) -> Result<(), TrackerError> {
        if self.session.is_some() {
            return Err(TrackerError::InvalidState("a session is already in progress"));
        }
        self.session = Some(PerformanceSession::new());
        Ok(())
    }

    /// Abandons the in-progress session without scoring it.
    pub fn discard_session(&mut self) {
        self.session = None;
    }

    pub fn record_answer(
        &mut self,
        question: &Question,
        is_correct: bool,
        time_spent_ms: u64,
    ) -> Result<(), TrackerError> {
        let session = self
            .session
            .as_mut()
            .ok_or(TrackerError::InvalidState("no session in progress"))?;

        session.push(PerformanceRecord {
            question_id: question.id.clone(),
            difficulty: question.difficulty,
            correct: is_correct,
            time_spent_ms,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    /// Seeds the stored level from an explicit starting level (for example a
    /// converted quiz result) and persists it.
    pub async fn calibrate(&mut self, level: LiveLevel) -> Result<(), TrackerError> {
        if self.profile.current_level == level {
            return Ok(());
        }
        info!(
            "Calibrating {} from {} to {level}",
            self.user_id, self.profile.current_level
        );
        self.profile.current_level = level;
        self.store.save(&self.user_id, &self.profile).await?;
        Ok(())
    }

    pub async fn finalize_session(&mut self) -> Result<FinalizeOutcome, TrackerError> {
        let session = self
            .session
            .take()
            .ok_or(TrackerError::InvalidState("no session in progress"))?;

        if session.total == 0 {
            return Ok(FinalizeOutcome::NoOp);
        }

        let new_level =
            classify_from_performance(session.correct, session.total, session.average_difficulty)?;
        let previous_level = self.profile.current_level;
        let level_changed = new_level != previous_level;
        let feedback = generate_feedback(new_level, &session, level_changed);
        let (correct, total) = (session.correct, session.total);

        self.profile.history.push(SessionHistoryEntry {
            session,
            level: new_level,
            level_changed,
            finalized_at: Utc::now(),
        });
        if level_changed {
            self.profile.current_level = new_level;
        }

        let persisted = match self.store.save(&self.user_id, &self.profile).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to persist profile for {}: {e}", self.user_id);
                false
            }
        };

        info!(
            "Finalized session for {}: {correct}/{total}, level {previous_level} -> {new_level}",
            self.user_id
        );

        Ok(FinalizeOutcome::Completed(SessionSummary {
            new_level,
            previous_level,
            level_changed,
            feedback,
            correct,
            total,
            persisted,
        }))
    }

    pub fn stats(&self) -> PerformanceStats {
        let history = &self.profile.history;

        let (correct, total) = history.iter().fold((0u64, 0u64), |(c, t), entry| {
            (c + entry.session.correct as u64, t + entry.session.total as u64)
        });
        let overall_accuracy = if total == 0 {
            0
        } else {
            percent(correct as f64 / total as f64)
        };

        let mut level_histogram = BTreeMap::new();
        for entry in history {
            *level_histogram.entry(entry.level).or_insert(0) += 1;
        }

        let recent_start = history.len().saturating_sub(RECENT_WINDOW);

        PerformanceStats {
            total_sessions: history.len(),
            overall_accuracy,
            level_histogram,
            current_level: self.profile.current_level,
            recent_sessions: history[recent_start..].to_vec(),
        }
    }

    pub fn recent_accuracy(&self) -> Option<f64> {
        recent_accuracy(&self.profile.history)
    }
}

/// Mean per-session accuracy over the last `RECENT_WINDOW` finalized sessions.
/// A heuristic for picking the next question, not a scoring contract.
pub fn recent_accuracy(history: &[SessionHistoryEntry]) -> Option<f64> {
    let recent = &history[history.len().saturating_sub(RECENT_WINDOW)..];
    if recent.is_empty() {
        return None;
    }
    let sum: f64 = recent.iter().map(|e| e.session.accuracy()).sum();
    Some(sum / recent.len() as f64)
}
