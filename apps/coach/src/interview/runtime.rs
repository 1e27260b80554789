//! InterviewRuntime: one task per interview that owns the machine, tracker
//! and audio coordinator, executes effects and feeds results back in.
//!
//! The loop multiplexes client commands, a one-second ticker, in-flight
//! service calls and playbacks, and recognition events. Dropping every
//! `SessionHandle` closes the command channel; the loop then drops its
//! in-flight futures and releases audio in one synchronous step.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioCoordinator, AudioError, AudioEvent};
use crate::interview::machine::{
    InterviewSetup, RequestId, SessionEffect, SessionError, SessionEvent, SessionMachine,
    SessionSnapshot,
};
use crate::models::question::{AnswerPayload, Question};
use crate::performance::PerformanceTracker;
use crate::question_client::fallback::{fallback_question, fallback_session_id};
use crate::question_client::{
    NextQuestionQuery, QuestionService, QuestionServiceError, Recommendations, SubmitAnswerRequest,
};

const COMMAND_BUFFER: usize = 32;

type Reply = oneshot::Sender<Result<SessionSnapshot, SessionError>>;

pub enum SessionCommand {
    Start(InterviewSetup, Reply),
    Answer(AnswerPayload, Reply),
    /// Typed text kept for the no-recognizer `stop_listening` fallback.
    Draft(String, Reply),
    Listen(Reply),
    StopListening(Reply),
    End(Reply),
    Reset(Reply),
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Client side of a running interview. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Latest published snapshot; does not wait for the runtime.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub async fn start(&self, setup: InterviewSetup) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Start(setup, reply)).await
    }

    pub async fn answer(&self, answer: AnswerPayload) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Answer(answer, reply)).await
    }

    pub async fn draft(&self, text: String) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Draft(text, reply)).await
    }

    pub async fn listen(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::Listen).await
    }

    pub async fn stop_listening(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::StopListening).await
    }

    pub async fn end(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::End).await
    }

    pub async fn reset(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(SessionCommand::Reset).await
    }

    async fn request<F>(&self, build: F) -> Result<SessionSnapshot, SessionError>
    where
        F: FnOnce(Reply) -> SessionCommand,
    {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────────────────────────

enum Completion {
    SessionCreated {
        request: RequestId,
        result: Result<String, QuestionServiceError>,
    },
    AnswerSent {
        request: RequestId,
        result: Result<Option<String>, QuestionServiceError>,
    },
    QuestionFetched {
        request: RequestId,
        result: Result<Question, QuestionServiceError>,
    },
    Recommendations {
        request: RequestId,
        result: Result<Recommendations, QuestionServiceError>,
    },
    PlaybackFinished(Result<(), AudioError>),
}

enum Step {
    Command(SessionCommand),
    Closed,
    Tick,
    Completed(Completion),
    Audio(AudioEvent),
}

pub struct InterviewRuntime {
    machine: SessionMachine,
    tracker: PerformanceTracker,
    audio: AudioCoordinator,
    questions: Arc<dyn QuestionService>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    ticker: Interval,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl InterviewRuntime {
    /// Spawns the interview task and returns its handle. The interview sits in
    /// `Setup` until `SessionHandle::start`.
    pub fn spawn(
        tracker: PerformanceTracker,
        audio: AudioCoordinator,
        questions: Arc<dyn QuestionService>,
    ) -> SessionHandle {
        let machine = SessionMachine::new();
        let (snapshots, snapshot_rx) = watch::channel(machine.snapshot());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let runtime = Self {
            machine,
            tracker,
            audio,
            questions,
            in_flight: FuturesUnordered::new(),
            ticker,
            snapshots,
        };
        tokio::spawn(runtime.run(command_rx));

        SessionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("Interview runtime started for {}", self.tracker.user_id());
        self.publish();

        loop {
            let step = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Closed,
                },
                _ = self.ticker.tick() => Step::Tick,
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => Step::Completed(done),
                Some(event) = self.audio.next_event() => Step::Audio(event),
            };

            match step {
                Step::Command(command) => self.on_command(command).await,
                Step::Closed => break,
                Step::Tick => {
                    self.dispatch_logged(SessionEvent::Tick).await;
                    self.publish();
                }
                Step::Completed(done) => {
                    self.on_completion(done).await;
                    self.publish();
                }
                Step::Audio(event) => {
                    self.on_audio(event).await;
                    self.publish();
                }
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.in_flight = FuturesUnordered::new();
        self.audio.release();
        if self.tracker.has_active_session() {
            self.tracker.discard_session();
        }
        info!("Interview runtime for {} stopped", self.tracker.user_id());
    }

    // ── inputs ──────────────────────────────────────────────────────────────

    async fn on_command(&mut self, command: SessionCommand) {
        let (result, reply) = match command {
            SessionCommand::Start(setup, reply) => {
                (self.dispatch(SessionEvent::Confirm(setup)).await, reply)
            }
            SessionCommand::Answer(answer, reply) => {
                (self.dispatch(SessionEvent::Submit(answer)).await, reply)
            }
            SessionCommand::Draft(text, reply) => {
                self.audio.buffer_typed(&text);
                (Ok(()), reply)
            }
            SessionCommand::Listen(reply) => (self.listen().await, reply),
            SessionCommand::StopListening(reply) => (self.stop_listening().await, reply),
            SessionCommand::End(reply) => (self.dispatch(SessionEvent::End).await, reply),
            SessionCommand::Reset(reply) => (self.dispatch(SessionEvent::Reset).await, reply),
        };

        self.publish();
        let _ = reply.send(result.map(|()| self.snapshot()));
    }

    async fn listen(&mut self) -> Result<(), SessionError> {
        if self.machine.phase().is_terminal() {
            return Err(SessionError::InvalidState {
                phase: self.machine.phase(),
                action: "listen",
            });
        }
        if !self.audio.state().mic_armed {
            self.audio.arm_microphone().await?;
        }
        self.audio.start_listening().await?;
        Ok(())
    }

    async fn stop_listening(&mut self) -> Result<(), SessionError> {
        let flushed = self.audio.stop_listening().await?;
        if let Some(text) = flushed {
            if self.machine.accepts_answers() {
                self.dispatch(SessionEvent::Submit(AnswerPayload::Text(text)))
                    .await?;
            }
        }
        Ok(())
    }

    async fn on_audio(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::Interim(_) => {}
            AudioEvent::Utterance(text) => {
                if self.machine.accepts_answers() {
                    self.dispatch_logged(SessionEvent::Submit(AnswerPayload::Text(text)))
                        .await;
                } else {
                    debug!(
                        "Dropping utterance received in phase {}",
                        self.machine.phase()
                    );
                }
            }
        }
    }

    async fn on_completion(&mut self, done: Completion) {
        let event = match done {
            Completion::SessionCreated { request, result } => match result {
                Ok(session_id) => SessionEvent::SessionCreated {
                    request,
                    session_id,
                    fallback: false,
                },
                Err(e) => {
                    let session_id = fallback_session_id();
                    warn!("Question service session bootstrap failed ({e}); continuing as {session_id}");
                    SessionEvent::SessionCreated {
                        request,
                        session_id,
                        fallback: true,
                    }
                }
            },
            Completion::AnswerSent { request, result } => {
                let reply = result.unwrap_or_else(|e| {
                    warn!("Failed to submit answer: {e}");
                    None
                });
                SessionEvent::AnswerSent { request, reply }
            }
            Completion::QuestionFetched { request, result } => {
                let question = result.unwrap_or_else(|e| {
                    warn!("Failed to fetch next question ({e}); using fallback question");
                    fallback_question(self.tracker.current_level())
                });
                SessionEvent::QuestionFetched { request, question }
            }
            Completion::Recommendations { request, result } => {
                let recommendations = result.unwrap_or_else(|e| {
                    warn!("Failed to fetch recommendations: {e}");
                    Recommendations::default()
                });
                SessionEvent::RecommendationsLoaded {
                    request,
                    recommendations,
                }
            }
            Completion::PlaybackFinished(result) => {
                if let Err(e) = result {
                    warn!("Playback failed: {e}");
                }
                if let Err(e) = self.audio.finish_speaking().await {
                    warn!("Failed to resume listening after playback: {e}");
                }
                return;
            }
        };
        self.dispatch_logged(event).await;
    }

    // ── effects ─────────────────────────────────────────────────────────────

    /// Feeds `event` to the machine and executes the resulting effects,
    /// including effects produced by follow-up events.
    async fn dispatch(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        let mut queue: VecDeque<SessionEffect> = self.machine.handle(event)?.into();
        while let Some(effect) = queue.pop_front() {
            if let Some(follow_up) = self.execute(effect).await {
                match self.machine.handle(follow_up) {
                    Ok(effects) => queue.extend(effects),
                    Err(e) => error!("Follow-up event rejected: {e}"),
                }
            }
        }
        Ok(())
    }

    /// For events that do not come from a client, where an error has no one
    /// to be reported to.
    async fn dispatch_logged(&mut self, event: SessionEvent) {
        if let Err(e) = self.dispatch(event).await {
            error!("Interview event rejected: {e}");
        }
    }

    async fn execute(&mut self, effect: SessionEffect) -> Option<SessionEvent> {
        match effect {
            SessionEffect::BeginTracking { starting_level } => {
                if let Some(level) = starting_level {
                    if let Err(e) = self.tracker.calibrate(level).await {
                        warn!("Failed to persist starting level {level}: {e}");
                    }
                }
                self.tracker.discard_session();
                if let Err(e) = self.tracker.start_session() {
                    error!("Failed to start performance session: {e}");
                }
            }
            SessionEffect::DiscardTracking => self.tracker.discard_session(),
            SessionEffect::CreateSession { request } => {
                let Some(setup) = self.machine.setup() else {
                    error!("Session bootstrap requested without a setup");
                    return None;
                };
                let body = setup.session_request(self.tracker.current_level());
                let questions = Arc::clone(&self.questions);
                self.in_flight.push(
                    async move {
                        let result = questions.create_session(&body).await;
                        Completion::SessionCreated { request, result }
                    }
                    .boxed(),
                );
            }
            SessionEffect::ArmTimer => self.ticker.reset(),
            SessionEffect::Speak(text) => match self.audio.speak(&text).await {
                Ok(playback) => self
                    .in_flight
                    .push(playback.map(Completion::PlaybackFinished).boxed()),
                Err(AudioError::Unsupported(_)) => debug!("No synthesizer; line kept in transcript only"),
                Err(e) => warn!("Failed to speak line: {e}"),
            },
            SessionEffect::StartListening => self.start_voice_input().await,
            SessionEffect::StopListening => {
                if let Err(e) = self.audio.stop_listening().await {
                    warn!("Failed to stop listening: {e}");
                }
            }
            SessionEffect::RecordAnswer {
                question,
                correct,
                time_spent_ms,
            } => {
                if let Err(e) = self.tracker.record_answer(&question, correct, time_spent_ms) {
                    error!("Failed to record answer to {}: {e}", question.id);
                }
            }
            SessionEffect::SendAnswer {
                request,
                session_id,
                question,
                answer,
            } => {
                let (role, experience) = self
                    .machine
                    .setup()
                    .map(|s| (s.role.as_str(), s.experience.as_str()))
                    .unwrap_or_default();
                let body = SubmitAnswerRequest::new(
                    &question,
                    &answer,
                    role,
                    experience,
                    self.tracker.current_level(),
                );
                let questions = Arc::clone(&self.questions);
                self.in_flight.push(
                    async move {
                        let result = questions.submit_answer(&session_id, &body).await;
                        Completion::AnswerSent { request, result }
                    }
                    .boxed(),
                );
            }
            SessionEffect::FetchQuestion { request, session_id } => {
                let query = NextQuestionQuery {
                    role: self
                        .machine
                        .setup()
                        .map(|s| s.role.clone())
                        .unwrap_or_default(),
                    level: self.tracker.current_level(),
                    recent_accuracy: self.tracker.recent_accuracy(),
                };
                let questions = Arc::clone(&self.questions);
                self.in_flight.push(
                    async move {
                        let result = questions.next_question(&session_id, &query).await;
                        Completion::QuestionFetched { request, result }
                    }
                    .boxed(),
                );
            }
            SessionEffect::Finalize => match self.tracker.finalize_session().await {
                Ok(outcome) => return Some(SessionEvent::Finalized(outcome)),
                Err(e) => error!("Failed to finalize performance session: {e}"),
            },
            SessionEffect::FetchRecommendations { request, session_id } => {
                let questions = Arc::clone(&self.questions);
                self.in_flight.push(
                    async move {
                        let result = questions.recommendations(&session_id).await;
                        Completion::Recommendations { request, result }
                    }
                    .boxed(),
                );
            }
        }
        None
    }

    /// Arms the microphone if needed and starts listening. Every failure here
    /// degrades to typed answers.
    async fn start_voice_input(&mut self) {
        if !self.audio.state().mic_armed {
            match self.audio.arm_microphone().await {
                Ok(()) => {}
                Err(AudioError::PermissionDenied) => return,
                Err(AudioError::Unsupported(_)) => {
                    debug!("No microphone; interview runs text-only");
                    return;
                }
                Err(e) => {
                    warn!("Failed to arm microphone: {e}");
                    return;
                }
            }
        }
        match self.audio.start_listening().await {
            Ok(outcome) => debug!("Listening: {outcome:?}"),
            Err(AudioError::Unsupported(_)) => debug!("No recognizer; answers are typed"),
            Err(e) => warn!("Failed to start listening: {e}"),
        }
    }

    // ── snapshots ───────────────────────────────────────────────────────────

    fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = self.machine.snapshot();
        snapshot.audio = self.audio.state();
        snapshot.interim_transcript = self.audio.interim_transcript().map(str::to_string);
        snapshot.voice_available = self.audio.capabilities().voice_input();
        snapshot
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
