//! SessionMachine: the interview as a pure finite-state machine.
//!
//! All inputs arrive through `handle(event)`, which mutates the machine and
//! returns the effects the runtime must execute (service calls, speech,
//! tracker updates). Results of those effects come back as further events
//! tagged with the `RequestId` they were issued under; a result whose id is no
//! longer pending is ignored.
//!
//! ```text
//! Setup → Bootstrapping → Introduction → Submitting → FetchingNext → AwaitingAnswer
//!                                            ↑                             │
//!                                            └─────────────────────────────┘
//! any non-terminal phase ──(timer hits zero)──→ TimedOut → Ended
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::audio::{AudioError, AudioState};
use crate::interview::prompts::{
    closing_line, welcome_line, GENERIC_INTRO_PROMPT, INTRO_PROMPT, INTRO_QUESTION_ID,
};
use crate::leveling::LiveLevel;
use crate::models::question::{AnswerPayload, AnswerSubmission, Question, QuestionKind};
use crate::models::transcript::TranscriptEntry;
use crate::performance::FinalizeOutcome;
use crate::question_client::{CreateSessionRequest, Recommendations};

// ─────────────────────────────────────────────────────────────────────────────
// Phases and setup
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Setup,
    Bootstrapping,
    Introduction,
    AwaitingAnswer,
    Submitting,
    FetchingNext,
    TimedOut,
    Ended,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Setup => "setup",
            SessionPhase::Bootstrapping => "bootstrapping",
            SessionPhase::Introduction => "introduction",
            SessionPhase::AwaitingAnswer => "awaiting_answer",
            SessionPhase::Submitting => "submitting",
            SessionPhase::FetchingNext => "fetching_next",
            SessionPhase::TimedOut => "timed_out",
            SessionPhase::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Ended)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Explicit,
    TimedOut,
    QuestionLimit,
}

fn default_mode() -> String {
    "technical".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSetup {
    pub role: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub experience: String,
    pub candidate_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub notes: String,
    /// Questions after the introduction.
    pub question_count: u32,
    pub duration_secs: u64,
    /// Overrides the tracker's stored level for this interview.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_level: Option<LiveLevel>,
}

impl InterviewSetup {
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.role.trim().is_empty() {
            return Err(SessionError::InvalidSetup("role cannot be empty".to_string()));
        }
        if self.candidate_name.trim().is_empty() {
            return Err(SessionError::InvalidSetup(
                "candidate name cannot be empty".to_string(),
            ));
        }
        if self.question_count == 0 {
            return Err(SessionError::InvalidSetup(
                "question count must be at least 1".to_string(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(SessionError::InvalidSetup(
                "duration must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_request(&self, level: LiveLevel) -> CreateSessionRequest {
        CreateSessionRequest {
            role: self.role.trim().to_string(),
            mode: self.mode.clone(),
            experience: self.experience.clone(),
            level,
            question_count: self.question_count,
            duration: self.duration_secs,
            candidate_name: self.candidate_name.trim().to_string(),
            email: self.email.clone(),
            notes: self.notes.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events, effects, errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Confirm(InterviewSetup),
    /// `fallback` is set when the id was generated locally after the
    /// Question Service failed.
    SessionCreated {
        request: RequestId,
        session_id: String,
        fallback: bool,
    },
    /// Typed, code, choice or spoken answer. Utterances arrive as `Text`.
    Submit(AnswerPayload),
    AnswerSent {
        request: RequestId,
        reply: Option<String>,
    },
    QuestionFetched {
        request: RequestId,
        question: Question,
    },
    /// One second of wall time elapsed.
    Tick,
    End,
    Reset,
    Finalized(FinalizeOutcome),
    RecommendationsLoaded {
        request: RequestId,
        recommendations: Recommendations,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Calibrate to `starting_level` when given, then open a tracker session.
    BeginTracking { starting_level: Option<LiveLevel> },
    DiscardTracking,
    CreateSession { request: RequestId },
    /// Restart the one-second ticker so the first decrement is a full second away.
    ArmTimer,
    Speak(String),
    StartListening,
    StopListening,
    RecordAnswer {
        question: Question,
        correct: bool,
        time_spent_ms: u64,
    },
    SendAnswer {
        request: RequestId,
        session_id: String,
        question: Question,
        answer: AnswerPayload,
    },
    FetchQuestion { request: RequestId, session_id: String },
    Finalize,
    FetchRecommendations { request: RequestId, session_id: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("Cannot {action} while the interview is in phase '{phase}'")]
    InvalidState {
        phase: SessionPhase,
        action: &'static str,
    },

    #[error("Invalid setup: {0}")]
    InvalidSetup(String),

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Interview is no longer running")]
    Closed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only projection handed to clients after every step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub fallback_session: bool,
    pub question: Option<Question>,
    /// True while the next question is being fetched; `question` still holds
    /// the previous one.
    pub question_loading: bool,
    pub seconds_remaining: u64,
    pub questions_answered: u32,
    pub last_submission: Option<AnswerSubmission>,
    pub transcript: Vec<TranscriptEntry>,
    pub interim_transcript: Option<String>,
    pub audio: AudioState,
    pub voice_available: bool,
    pub end_reason: Option<EndReason>,
    pub feedback: Option<FinalizeOutcome>,
    pub recommendations: Option<Recommendations>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Machine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Pending {
    bootstrap: Option<RequestId>,
    answer: Option<RequestId>,
    fetch: Option<RequestId>,
    recommendations: Option<RequestId>,
}

#[derive(Debug)]
pub struct SessionMachine {
    phase: SessionPhase,
    setup: Option<InterviewSetup>,
    session_id: Option<String>,
    fallback_session: bool,
    question: Option<Question>,
    question_loading: bool,
    question_elapsed_secs: u64,
    seconds_remaining: u64,
    timer_armed: bool,
    questions_answered: u32,
    last_submission: Option<AnswerSubmission>,
    transcript: Vec<TranscriptEntry>,
    end_reason: Option<EndReason>,
    feedback: Option<FinalizeOutcome>,
    recommendations: Option<Recommendations>,
    pending: Pending,
    /// Monotonic across resets so results from a previous run stay stale.
    next_request: u64,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Setup,
            setup: None,
            session_id: None,
            fallback_session: false,
            question: None,
            question_loading: false,
            question_elapsed_secs: 0,
            seconds_remaining: 0,
            timer_armed: false,
            questions_answered: 0,
            last_submission: None,
            transcript: Vec::new(),
            end_reason: None,
            feedback: None,
            recommendations: None,
            pending: Pending::default(),
            next_request: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn setup(&self) -> Option<&InterviewSetup> {
        self.setup.as_ref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn seconds_remaining(&self) -> u64 {
        self.seconds_remaining
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn accepts_answers(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Introduction | SessionPhase::AwaitingAnswer
        )
    }

    /// Snapshot without audio details; the runtime fills those in.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            session_id: self.session_id.clone(),
            fallback_session: self.fallback_session,
            question: self.question.clone(),
            question_loading: self.question_loading,
            seconds_remaining: self.seconds_remaining,
            questions_answered: self.questions_answered,
            last_submission: self.last_submission.clone(),
            transcript: self.transcript.clone(),
            interim_transcript: None,
            audio: AudioState::default(),
            voice_available: false,
            end_reason: self.end_reason,
            feedback: self.feedback.clone(),
            recommendations: self.recommendations.clone(),
        }
    }

    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionEffect>, SessionError> {
        let before = self.phase;
        let result = match event {
            SessionEvent::Confirm(setup) => self.on_confirm(setup),
            SessionEvent::SessionCreated {
                request,
                session_id,
                fallback,
            } => Ok(self.on_session_created(request, session_id, fallback)),
            SessionEvent::Submit(answer) => self.on_submit(answer),
            SessionEvent::AnswerSent { request, reply } => Ok(self.on_answer_sent(request, reply)),
            SessionEvent::QuestionFetched { request, question } => {
                Ok(self.on_question_fetched(request, question))
            }
            SessionEvent::Tick => Ok(self.on_tick()),
            SessionEvent::End => self.on_end(),
            SessionEvent::Reset => Ok(self.on_reset()),
            SessionEvent::Finalized(outcome) => {
                self.feedback = Some(outcome);
                Ok(Vec::new())
            }
            SessionEvent::RecommendationsLoaded {
                request,
                recommendations,
            } => {
                if self.pending.recommendations == Some(request) {
                    self.pending.recommendations = None;
                    self.recommendations = Some(recommendations);
                } else {
                    debug!("Ignoring stale recommendations");
                }
                Ok(Vec::new())
            }
        };
        if self.phase != before {
            debug!("Interview phase {before} -> {}", self.phase);
        }
        result
    }

    // ── transitions ─────────────────────────────────────────────────────────

    fn on_confirm(&mut self, setup: InterviewSetup) -> Result<Vec<SessionEffect>, SessionError> {
        if self.phase != SessionPhase::Setup {
            return Err(self.invalid("confirm a setup"));
        }
        setup.validate()?;

        self.clear();
        let starting_level = setup.starting_level;
        self.setup = Some(setup);
        let request = self.next_request_id();
        self.pending.bootstrap = Some(request);
        self.phase = SessionPhase::Bootstrapping;

        Ok(vec![
            SessionEffect::BeginTracking { starting_level },
            SessionEffect::CreateSession { request },
        ])
    }

    fn on_session_created(
        &mut self,
        request: RequestId,
        session_id: String,
        fallback: bool,
    ) -> Vec<SessionEffect> {
        if self.pending.bootstrap != Some(request) || self.phase != SessionPhase::Bootstrapping {
            debug!("Ignoring stale session bootstrap result");
            return Vec::new();
        }
        self.pending.bootstrap = None;

        let Some((welcome, duration)) = self
            .setup
            .as_ref()
            .map(|setup| (welcome_line(setup), setup.duration_secs))
        else {
            return Vec::new();
        };

        self.session_id = Some(session_id);
        self.fallback_session = fallback;
        self.seconds_remaining = duration;
        self.timer_armed = true;
        self.phase = SessionPhase::Introduction;

        let prompt = if fallback { GENERIC_INTRO_PROMPT } else { INTRO_PROMPT };
        vec![
            SessionEffect::ArmTimer,
            self.say(welcome),
            SessionEffect::StartListening,
            self.present(Question::open_text(INTRO_QUESTION_ID, prompt, 1)),
        ]
    }

    fn on_submit(&mut self, answer: AnswerPayload) -> Result<Vec<SessionEffect>, SessionError> {
        if !self.accepts_answers() {
            return Err(self.invalid("submit an answer"));
        }
        let Some(question) = self.question.clone() else {
            return Err(self.invalid("submit an answer"));
        };

        let (entry_text, correct) = match &answer {
            AnswerPayload::Choice(index) => {
                if question.kind != QuestionKind::MultipleChoice {
                    return Err(SessionError::InvalidAnswer(
                        "this question does not take a choice".to_string(),
                    ));
                }
                let text = question.choice_text(*index).ok_or_else(|| {
                    SessionError::InvalidAnswer(format!("choice {index} is out of range"))
                })?;
                let correct = question.correct_index.map(|c| c == *index);
                (text.to_string(), correct)
            }
            AnswerPayload::Code(text) | AnswerPayload::Text(text) => {
                if text.trim().is_empty() {
                    return Err(SessionError::InvalidAnswer(
                        "answer cannot be empty".to_string(),
                    ));
                }
                (text.trim().to_string(), None)
            }
        };

        self.transcript.push(TranscriptEntry::candidate(entry_text));
        self.last_submission = Some(AnswerSubmission::new(question.id.clone(), answer.clone()));

        let mut effects = Vec::new();
        if let Some(correct) = correct.filter(|_| question.is_scored()) {
            effects.push(SessionEffect::RecordAnswer {
                question: question.clone(),
                correct,
                time_spent_ms: self.question_elapsed_secs * 1000,
            });
        }
        if self.phase == SessionPhase::AwaitingAnswer {
            self.questions_answered += 1;
        }

        let request = self.next_request_id();
        self.pending.answer = Some(request);
        effects.push(SessionEffect::SendAnswer {
            request,
            session_id: self.session_id.clone().unwrap_or_default(),
            question,
            answer,
        });
        self.phase = SessionPhase::Submitting;
        Ok(effects)
    }

    fn on_answer_sent(&mut self, request: RequestId, reply: Option<String>) -> Vec<SessionEffect> {
        if self.pending.answer != Some(request) {
            debug!("Ignoring stale answer reply");
            return Vec::new();
        }
        self.pending.answer = None;

        if self.phase == SessionPhase::Ended {
            // The interview ended while this answer was in flight: keep the
            // reply, issue nothing after it.
            if let Some(reply) = reply {
                self.transcript.push(TranscriptEntry::interviewer(reply));
            }
            return Vec::new();
        }
        if self.phase != SessionPhase::Submitting {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if let Some(reply) = reply {
            effects.push(self.say(reply));
        }

        let limit = self.setup.as_ref().map_or(u32::MAX, |s| s.question_count);
        if self.questions_answered >= limit {
            effects.extend(self.finish(EndReason::QuestionLimit));
            return effects;
        }

        let request = self.next_request_id();
        self.pending.fetch = Some(request);
        self.question_loading = true;
        self.phase = SessionPhase::FetchingNext;
        effects.push(SessionEffect::FetchQuestion {
            request,
            session_id: self.session_id.clone().unwrap_or_default(),
        });
        effects
    }

    fn on_question_fetched(&mut self, request: RequestId, question: Question) -> Vec<SessionEffect> {
        if self.pending.fetch != Some(request) || self.phase != SessionPhase::FetchingNext {
            debug!("Ignoring stale question");
            return Vec::new();
        }
        self.pending.fetch = None;
        self.phase = SessionPhase::AwaitingAnswer;
        vec![self.present(question)]
    }

    fn on_tick(&mut self) -> Vec<SessionEffect> {
        if !self.timer_armed || self.phase.is_terminal() || self.seconds_remaining == 0 {
            return Vec::new();
        }
        self.seconds_remaining -= 1;
        if self.question.is_some() && !self.question_loading {
            self.question_elapsed_secs += 1;
        }
        if self.seconds_remaining > 0 {
            return Vec::new();
        }
        self.phase = SessionPhase::TimedOut;
        self.finish(EndReason::TimedOut)
    }

    fn on_end(&mut self) -> Result<Vec<SessionEffect>, SessionError> {
        match self.phase {
            SessionPhase::Setup => Err(self.invalid("end the interview")),
            SessionPhase::Ended => Ok(Vec::new()),
            _ => Ok(self.finish(EndReason::Explicit)),
        }
    }

    fn on_reset(&mut self) -> Vec<SessionEffect> {
        if self.phase == SessionPhase::Setup {
            return Vec::new();
        }
        let was_live = !self.phase.is_terminal();
        self.clear();
        self.phase = SessionPhase::Setup;

        let mut effects = vec![SessionEffect::StopListening];
        if was_live {
            effects.push(SessionEffect::DiscardTracking);
        }
        effects
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    /// Moves to `Ended`. Runs once per interview; `on_tick` and `on_end` never
    /// call it from a terminal phase.
    fn finish(&mut self, reason: EndReason) -> Vec<SessionEffect> {
        self.end_reason = Some(reason);
        self.timer_armed = false;
        self.question_loading = false;
        self.pending.bootstrap = None;
        self.pending.fetch = None;
        self.phase = SessionPhase::Ended;

        let mut effects = vec![
            self.say(closing_line(reason).to_string()),
            SessionEffect::StopListening,
            SessionEffect::Finalize,
        ];
        if let Some(session_id) = self.session_id.clone() {
            let request = self.next_request_id();
            self.pending.recommendations = Some(request);
            effects.push(SessionEffect::FetchRecommendations { request, session_id });
        }
        effects
    }

    fn say(&mut self, text: String) -> SessionEffect {
        self.transcript.push(TranscriptEntry::interviewer(text.clone()));
        SessionEffect::Speak(text)
    }

    fn present(&mut self, question: Question) -> SessionEffect {
        let prompt = question.prompt.clone();
        self.question = Some(question);
        self.question_loading = false;
        self.question_elapsed_secs = 0;
        self.say(prompt)
    }

    fn clear(&mut self) {
        self.setup = None;
        self.session_id = None;
        self.fallback_session = false;
        self.question = None;
        self.question_loading = false;
        self.question_elapsed_secs = 0;
        self.seconds_remaining = 0;
        self.timer_armed = false;
        self.questions_answered = 0;
        self.last_submission = None;
        self.transcript.clear();
        self.end_reason = None;
        self.feedback = None;
        self.recommendations = None;
        self.pending = Pending::default();
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            phase: self.phase,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transcript::Speaker;
    use crate::question_client::fallback::{fallback_session_id, is_local_session};

    fn setup(question_count: u32, duration_secs: u64) -> InterviewSetup {
        InterviewSetup {
            role: "Backend Engineer".into(),
            mode: "technical".into(),
            experience: "3-5 years".into(),
            candidate_name: "Sam".into(),
            email: "sam@example.com".into(),
            notes: String::new(),
            question_count,
            duration_secs,
            starting_level: None,
        }
    }

    fn mc_question() -> Question {
        Question {
            id: "q-1".into(),
            kind: QuestionKind::MultipleChoice,
            prompt: "Which type owns its heap buffer?".into(),
            choices: Some(vec!["&str".into(), "String".into(), "&[u8]".into()]),
            correct_index: Some(1),
            reference_solution: None,
            difficulty: 4,
            language: None,
        }
    }

    fn create_request(effects: &[SessionEffect]) -> RequestId {
        effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::CreateSession { request } => Some(*request),
                _ => None,
            })
            .expect("no CreateSession effect")
    }

    fn send_request(effects: &[SessionEffect]) -> RequestId {
        effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::SendAnswer { request, .. } => Some(*request),
                _ => None,
            })
            .expect("no SendAnswer effect")
    }

    fn fetch_request(effects: &[SessionEffect]) -> RequestId {
        effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::FetchQuestion { request, .. } => Some(*request),
                _ => None,
            })
            .expect("no FetchQuestion effect")
    }

    fn has_fetch(effects: &[SessionEffect]) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, SessionEffect::FetchQuestion { .. }))
    }

    fn closing_lines(machine: &SessionMachine, reason: EndReason) -> usize {
        machine
            .transcript()
            .iter()
            .filter(|e| e.text == closing_line(reason))
            .count()
    }

    fn started(setup: InterviewSetup) -> SessionMachine {
        let mut machine = SessionMachine::new();
        let effects = machine.handle(SessionEvent::Confirm(setup)).unwrap();
        machine
            .handle(SessionEvent::SessionCreated {
                request: create_request(&effects),
                session_id: "srv-1".into(),
                fallback: false,
            })
            .unwrap();
        machine
    }

    /// Answers the introduction and serves `question` as the first real one.
    fn awaiting(setup: InterviewSetup, question: Question) -> SessionMachine {
        let mut machine = started(setup);
        let effects = machine
            .handle(SessionEvent::Submit(AnswerPayload::Text("I'm Sam.".into())))
            .unwrap();
        let effects = machine
            .handle(SessionEvent::AnswerSent {
                request: send_request(&effects),
                reply: None,
            })
            .unwrap();
        machine
            .handle(SessionEvent::QuestionFetched {
                request: fetch_request(&effects),
                question,
            })
            .unwrap();
        assert_eq!(machine.phase(), SessionPhase::AwaitingAnswer);
        machine
    }

    #[test]
    fn test_confirm_validates_setup() {
        let mut machine = SessionMachine::new();
        for bad in [
            InterviewSetup { role: "  ".into(), ..setup(3, 60) },
            InterviewSetup { candidate_name: String::new(), ..setup(3, 60) },
            setup(0, 60),
            setup(3, 0),
        ] {
            assert!(matches!(
                machine.handle(SessionEvent::Confirm(bad)),
                Err(SessionError::InvalidSetup(_))
            ));
        }
        assert_eq!(machine.phase(), SessionPhase::Setup);
    }

    #[test]
    fn test_confirm_starts_tracking_and_bootstraps() {
        let mut machine = SessionMachine::new();
        let effects = machine
            .handle(SessionEvent::Confirm(InterviewSetup {
                starting_level: Some(LiveLevel::Advanced),
                ..setup(3, 60)
            }))
            .unwrap();

        assert_eq!(machine.phase(), SessionPhase::Bootstrapping);
        assert_eq!(
            effects[0],
            SessionEffect::BeginTracking {
                starting_level: Some(LiveLevel::Advanced)
            }
        );
        create_request(&effects);

        assert_eq!(
            machine.handle(SessionEvent::Confirm(setup(3, 60))),
            Err(SessionError::InvalidState {
                phase: SessionPhase::Bootstrapping,
                action: "confirm a setup"
            })
        );
    }

    #[test]
    fn test_ticks_before_bootstrap_are_ignored() {
        let mut machine = SessionMachine::new();
        machine.handle(SessionEvent::Confirm(setup(3, 5))).unwrap();
        for _ in 0..10 {
            assert!(machine.handle(SessionEvent::Tick).unwrap().is_empty());
        }
        assert_eq!(machine.phase(), SessionPhase::Bootstrapping);
    }

    #[test]
    fn test_bootstrap_success_enters_introduction() {
        let mut machine = SessionMachine::new();
        let effects = machine.handle(SessionEvent::Confirm(setup(3, 60))).unwrap();
        let effects = machine
            .handle(SessionEvent::SessionCreated {
                request: create_request(&effects),
                session_id: "srv-1".into(),
                fallback: false,
            })
            .unwrap();

        assert_eq!(machine.phase(), SessionPhase::Introduction);
        assert_eq!(machine.session_id(), Some("srv-1"));
        assert_eq!(machine.seconds_remaining(), 60);
        assert_eq!(machine.question().unwrap().prompt, INTRO_PROMPT);

        let welcome = welcome_line(&setup(3, 60));
        assert_eq!(
            effects,
            vec![
                SessionEffect::ArmTimer,
                SessionEffect::Speak(welcome.clone()),
                SessionEffect::StartListening,
                SessionEffect::Speak(INTRO_PROMPT.to_string()),
            ]
        );
        let lines: Vec<&str> = machine.transcript().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(lines, vec![welcome.as_str(), INTRO_PROMPT]);
    }

    #[test]
    fn test_bootstrap_failure_uses_generic_prompt_and_local_id() {
        let mut machine = SessionMachine::new();
        let effects = machine.handle(SessionEvent::Confirm(setup(3, 60))).unwrap();
        machine
            .handle(SessionEvent::SessionCreated {
                request: create_request(&effects),
                session_id: fallback_session_id(),
                fallback: true,
            })
            .unwrap();

        assert_eq!(machine.phase(), SessionPhase::Introduction);
        assert!(is_local_session(machine.session_id().unwrap()));
        assert_eq!(machine.question().unwrap().prompt, GENERIC_INTRO_PROMPT);
        assert!(machine.snapshot().fallback_session);
    }

    #[test]
    fn test_stale_bootstrap_result_is_ignored() {
        let mut machine = SessionMachine::new();
        let first = machine.handle(SessionEvent::Confirm(setup(3, 60))).unwrap();
        machine.handle(SessionEvent::Reset).unwrap();
        let second = machine.handle(SessionEvent::Confirm(setup(3, 60))).unwrap();

        let effects = machine
            .handle(SessionEvent::SessionCreated {
                request: create_request(&first),
                session_id: "old".into(),
                fallback: false,
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(machine.phase(), SessionPhase::Bootstrapping);

        machine
            .handle(SessionEvent::SessionCreated {
                request: create_request(&second),
                session_id: "new".into(),
                fallback: false,
            })
            .unwrap();
        assert_eq!(machine.session_id(), Some("new"));
    }

    #[test]
    fn test_answer_reply_and_next_question() {
        let mut machine = started(setup(3, 60));

        let effects = machine
            .handle(SessionEvent::Submit(AnswerPayload::Text(" I build APIs. ".into())))
            .unwrap();
        assert_eq!(machine.phase(), SessionPhase::Submitting);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, SessionEffect::RecordAnswer { .. })));
        let candidate: Vec<_> = machine
            .transcript()
            .iter()
            .filter(|e| e.speaker == Speaker::Candidate)
            .collect();
        assert_eq!(candidate.len(), 1);
        assert_eq!(candidate[0].text, "I build APIs.");

        let effects = machine
            .handle(SessionEvent::AnswerSent {
                request: send_request(&effects),
                reply: Some("Thanks, let's dig in.".into()),
            })
            .unwrap();
        assert_eq!(effects[0], SessionEffect::Speak("Thanks, let's dig in.".into()));
        assert_eq!(machine.phase(), SessionPhase::FetchingNext);
        let snapshot = machine.snapshot();
        assert!(snapshot.question_loading);
        assert_eq!(snapshot.question.unwrap().id, INTRO_QUESTION_ID);
        // The introduction does not count toward the question limit.
        assert_eq!(snapshot.questions_answered, 0);

        let effects = machine
            .handle(SessionEvent::QuestionFetched {
                request: fetch_request(&effects),
                question: mc_question(),
            })
            .unwrap();
        assert_eq!(machine.phase(), SessionPhase::AwaitingAnswer);
        assert_eq!(effects, vec![SessionEffect::Speak(mc_question().prompt)]);
        assert!(!machine.snapshot().question_loading);
        assert_eq!(machine.transcript().last().unwrap().text, mc_question().prompt);
    }

    #[test]
    fn test_scored_choice_is_recorded_before_sending() {
        let mut machine = awaiting(setup(3, 60), mc_question());
        machine.handle(SessionEvent::Tick).unwrap();
        machine.handle(SessionEvent::Tick).unwrap();

        let effects = machine
            .handle(SessionEvent::Submit(AnswerPayload::Choice(1)))
            .unwrap();
        assert_eq!(
            effects[0],
            SessionEffect::RecordAnswer {
                question: mc_question(),
                correct: true,
                time_spent_ms: 2000,
            }
        );
        assert!(matches!(
            &effects[1],
            SessionEffect::SendAnswer { answer: AnswerPayload::Choice(1), session_id, .. }
                if session_id == "srv-1"
        ));
        assert_eq!(machine.transcript().last().unwrap().text, "String");

        let submission = machine.snapshot().last_submission.unwrap();
        assert_eq!(submission.question_id, "q-1");
        assert_eq!(submission.answer, AnswerPayload::Choice(1));
    }

    #[test]
    fn test_invalid_answers_leave_state_untouched() {
        let mut machine = awaiting(setup(3, 60), mc_question());
        let before = machine.transcript().len();

        assert!(matches!(
            machine.handle(SessionEvent::Submit(AnswerPayload::Choice(7))),
            Err(SessionError::InvalidAnswer(_))
        ));
        assert!(matches!(
            machine.handle(SessionEvent::Submit(AnswerPayload::Text("   ".into()))),
            Err(SessionError::InvalidAnswer(_))
        ));

        let mut intro = started(setup(3, 60));
        assert!(matches!(
            intro.handle(SessionEvent::Submit(AnswerPayload::Choice(0))),
            Err(SessionError::InvalidAnswer(_))
        ));

        assert_eq!(machine.transcript().len(), before);
        assert_eq!(machine.phase(), SessionPhase::AwaitingAnswer);
    }

    #[test]
    fn test_submit_while_submitting_is_invalid() {
        let mut machine = started(setup(3, 60));
        machine
            .handle(SessionEvent::Submit(AnswerPayload::Text("hello".into())))
            .unwrap();
        assert_eq!(
            machine.handle(SessionEvent::Submit(AnswerPayload::Text("again".into()))),
            Err(SessionError::InvalidState {
                phase: SessionPhase::Submitting,
                action: "submit an answer"
            })
        );
    }

    #[test]
    fn test_question_limit_ends_after_reply() {
        let mut machine = awaiting(setup(1, 600), mc_question());
        let effects = machine
            .handle(SessionEvent::Submit(AnswerPayload::Choice(0)))
            .unwrap();
        let effects = machine
            .handle(SessionEvent::AnswerSent {
                request: send_request(&effects),
                reply: Some("Not quite.".into()),
            })
            .unwrap();

        assert_eq!(machine.phase(), SessionPhase::Ended);
        assert_eq!(machine.end_reason(), Some(EndReason::QuestionLimit));
        assert_eq!(effects[0], SessionEffect::Speak("Not quite.".into()));
        assert!(effects.contains(&SessionEffect::Finalize));
        assert!(!has_fetch(&effects));
        assert_eq!(closing_lines(&machine, EndReason::QuestionLimit), 1);
    }

    #[test]
    fn test_timeout_during_submission_ends_once_without_fetch() {
        let mut machine = started(setup(5, 3));
        let submit = machine
            .handle(SessionEvent::Submit(AnswerPayload::Text("About me".into())))
            .unwrap();

        assert!(machine.handle(SessionEvent::Tick).unwrap().is_empty());
        assert!(machine.handle(SessionEvent::Tick).unwrap().is_empty());
        let effects = machine.handle(SessionEvent::Tick).unwrap();

        assert_eq!(machine.phase(), SessionPhase::Ended);
        assert_eq!(machine.end_reason(), Some(EndReason::TimedOut));
        assert_eq!(
            effects[..3],
            [
                SessionEffect::Speak(closing_line(EndReason::TimedOut).to_string()),
                SessionEffect::StopListening,
                SessionEffect::Finalize,
            ]
        );

        // The in-flight answer still lands, but nothing is fetched after it.
        let effects = machine
            .handle(SessionEvent::AnswerSent {
                request: send_request(&submit),
                reply: Some("Thanks for sharing.".into()),
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(machine.transcript().last().unwrap().text, "Thanks for sharing.");

        for _ in 0..5 {
            assert!(machine.handle(SessionEvent::Tick).unwrap().is_empty());
        }
        assert!(machine.handle(SessionEvent::End).unwrap().is_empty());
        assert_eq!(closing_lines(&machine, EndReason::TimedOut), 1);
        assert_eq!(machine.end_reason(), Some(EndReason::TimedOut));
    }

    #[test]
    fn test_late_question_after_end_is_ignored() {
        let mut machine = started(setup(3, 60));
        let effects = machine
            .handle(SessionEvent::Submit(AnswerPayload::Text("hi".into())))
            .unwrap();
        let effects = machine
            .handle(SessionEvent::AnswerSent {
                request: send_request(&effects),
                reply: None,
            })
            .unwrap();
        let fetch = fetch_request(&effects);

        let end = machine.handle(SessionEvent::End).unwrap();
        assert_eq!(
            end[0],
            SessionEffect::Speak(closing_line(EndReason::Explicit).to_string())
        );
        assert!(!machine.snapshot().question_loading);

        let effects = machine
            .handle(SessionEvent::QuestionFetched {
                request: fetch,
                question: mc_question(),
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(machine.question().unwrap().id, INTRO_QUESTION_ID);
    }

    #[test]
    fn test_end_rules() {
        let mut machine = SessionMachine::new();
        assert!(matches!(
            machine.handle(SessionEvent::End),
            Err(SessionError::InvalidState { .. })
        ));

        // Ending before the session id arrives skips recommendations.
        machine.handle(SessionEvent::Confirm(setup(3, 60))).unwrap();
        let effects = machine.handle(SessionEvent::End).unwrap();
        assert!(!effects
            .iter()
            .any(|e| matches!(e, SessionEffect::FetchRecommendations { .. })));
        assert_eq!(machine.phase(), SessionPhase::Ended);
    }

    #[test]
    fn test_feedback_and_recommendations_surface_in_snapshot() {
        let mut machine = started(setup(3, 60));
        let effects = machine.handle(SessionEvent::End).unwrap();
        let request = effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::FetchRecommendations { request, session_id } => {
                    assert_eq!(session_id, "srv-1");
                    Some(*request)
                }
                _ => None,
            })
            .unwrap();

        machine
            .handle(SessionEvent::Finalized(FinalizeOutcome::NoOp))
            .unwrap();
        machine
            .handle(SessionEvent::RecommendationsLoaded {
                request: RequestId(request.0 + 100),
                recommendations: Recommendations::default(),
            })
            .unwrap();
        assert!(machine.snapshot().recommendations.is_none());

        let recommendations = Recommendations {
            courses: vec![serde_json::json!({ "title": "Systems Design" })],
            articles: Vec::new(),
        };
        machine
            .handle(SessionEvent::RecommendationsLoaded {
                request,
                recommendations: recommendations.clone(),
            })
            .unwrap();

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.feedback, Some(FinalizeOutcome::NoOp));
        assert_eq!(snapshot.recommendations, Some(recommendations));
    }

    #[test]
    fn test_reset_returns_to_setup() {
        let mut machine = started(setup(3, 60));
        let effects = machine.handle(SessionEvent::Reset).unwrap();
        assert_eq!(
            effects,
            vec![SessionEffect::StopListening, SessionEffect::DiscardTracking]
        );

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Setup);
        assert!(snapshot.transcript.is_empty());
        assert!(snapshot.session_id.is_none());
        assert!(snapshot.question.is_none());
        assert_eq!(snapshot.seconds_remaining, 0);

        // A finished interview has already been finalized.
        let mut machine = started(setup(3, 60));
        machine.handle(SessionEvent::End).unwrap();
        let effects = machine.handle(SessionEvent::Reset).unwrap();
        assert_eq!(effects, vec![SessionEffect::StopListening]);
        assert!(machine.snapshot().feedback.is_none());

        machine.handle(SessionEvent::Confirm(setup(2, 30))).unwrap();
        assert_eq!(machine.phase(), SessionPhase::Bootstrapping);
    }

    #[test]
    fn test_setup_deserializes_with_defaults() {
        let setup: InterviewSetup = serde_json::from_value(serde_json::json!({
            "role": "Data Engineer",
            "candidateName": "Ari",
            "questionCount": 4,
            "durationSecs": 600,
            "startingLevel": "moderate"
        }))
        .unwrap();
        assert_eq!(setup.mode, "technical");
        assert_eq!(setup.starting_level, Some(LiveLevel::Moderate));
        assert!(setup.validate().is_ok());
    }
}
