//! AudioCoordinator: owns the microphone, recognizer and synthesizer handles
//! and guarantees the interviewer's synthesized voice is never transcribed as
//! candidate speech.
//!
//! Invariant: `speaking && listening` is never true. `speak` suspends
//! recognition before playback starts; `finish_speaking` resumes it if a
//! listen request is still pending.
//!
//! Playback is split in two so the caller's event loop keeps running while
//! the interviewer talks:
//! 1. `speak` suspends listening and returns a `Playback` future,
//! 2. the caller awaits it alongside its other work,
//! 3. the caller reports completion through `finish_speaking`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::meter::run_meter;
use crate::audio::{
    AudioCapabilities, AudioError, AudioPhase, AudioState, Capability, MicrophoneProvider,
    Recognition, SpeechRecognizer, SpeechSynthesizer,
};

/// Resolves when the synthesizer finishes speaking one line.
pub type Playback = Pin<Box<dyn Future<Output = Result<(), AudioError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// Provisional text for live display; replaces any previous interim text.
    Interim(String),
    /// A finalized candidate utterance.
    Utterance(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    Started,
    AlreadyListening,
    /// Queued behind current playback; starts when speaking ends.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MicState {
    Idle,
    Requested,
    Active,
    Denied,
}

pub struct AudioCoordinator {
    microphone: Arc<dyn MicrophoneProvider>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,

    mic: MicState,
    listening: bool,
    /// Explicit listen request not yet cancelled by `stop_listening`.
    listen_requested: bool,
    /// Playbacks handed out by `speak` and not yet finished.
    active_playbacks: usize,

    level_tx: watch::Sender<f32>,
    level_rx: watch::Receiver<f32>,
    meter_task: Option<JoinHandle<()>>,

    recognition_tx: mpsc::UnboundedSender<Recognition>,
    recognition_rx: mpsc::UnboundedReceiver<Recognition>,
    interim: Option<String>,
    typed_buffer: String,
}

impl AudioCoordinator {
    pub fn new(
        microphone: Arc<dyn MicrophoneProvider>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let (level_tx, level_rx) = watch::channel(0.0);
        let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
        Self {
            microphone,
            recognizer,
            synthesizer,
            mic: MicState::Idle,
            listening: false,
            listen_requested: false,
            active_playbacks: 0,
            level_tx,
            level_rx,
            meter_task: None,
            recognition_tx,
            recognition_rx,
            interim: None,
            typed_buffer: String::new(),
        }
    }

    pub fn capabilities(&self) -> AudioCapabilities {
        AudioCapabilities {
            microphone: self.microphone.is_supported() && self.mic != MicState::Denied,
            speech_recognition: self.recognizer.is_supported(),
            speech_synthesis: self.synthesizer.is_supported(),
        }
    }

    pub fn state(&self) -> AudioState {
        AudioState {
            mic_armed: self.mic == MicState::Active,
            listening: self.listening,
            speaking: self.is_speaking(),
            current_level: self.current_level(),
        }
    }

    pub fn phase(&self) -> AudioPhase {
        if self.is_speaking() {
            AudioPhase::Speaking
        } else if self.listening {
            AudioPhase::Listening
        } else {
            match self.mic {
                MicState::Active => AudioPhase::MicActive,
                MicState::Requested => AudioPhase::MicRequested,
                MicState::Idle | MicState::Denied => AudioPhase::Idle,
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.active_playbacks > 0
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Latest metered input level in [0, 1]. Reflects raw microphone energy
    /// whenever the mic is armed, regardless of listen/speak state.
    pub fn current_level(&self) -> f32 {
        *self.level_rx.borrow()
    }

    pub fn interim_transcript(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    // ── microphone ──────────────────────────────────────────────────────────

    /// Requests capture permission once. A refusal is remembered and returned
    /// again without re-prompting.
    pub async fn arm_microphone(&mut self) -> Result<(), AudioError> {
        match self.mic {
            MicState::Active => return Ok(()),
            MicState::Denied => return Err(AudioError::PermissionDenied),
            MicState::Requested => return Err(AudioError::InvalidState("microphone request in flight")),
            MicState::Idle => {}
        }
        if !self.microphone.is_supported() {
            return Err(AudioError::Unsupported(Capability::Microphone));
        }

        self.mic = MicState::Requested;
        match self.microphone.acquire().await {
            Ok(frames) => {
                self.mic = MicState::Active;
                self.meter_task = Some(tokio::spawn(run_meter(frames, self.level_tx.clone())));
                info!("Microphone armed");
                Ok(())
            }
            Err(AudioError::PermissionDenied) => {
                self.mic = MicState::Denied;
                warn!("Microphone permission denied; continuing with text input");
                Err(AudioError::PermissionDenied)
            }
            Err(e) => {
                self.mic = MicState::Idle;
                warn!("Microphone unavailable: {e}");
                Err(e)
            }
        }
    }

    // ── recognition ─────────────────────────────────────────────────────────

    pub async fn start_listening(&mut self) -> Result<ListenOutcome, AudioError> {
        if self.mic != MicState::Active {
            return Err(AudioError::InvalidState("microphone is not armed"));
        }
        if !self.recognizer.is_supported() {
            return Err(AudioError::Unsupported(Capability::SpeechRecognition));
        }
        if self.listening {
            return Ok(ListenOutcome::AlreadyListening);
        }

        self.listen_requested = true;
        if self.is_speaking() {
            debug!("Listen request queued behind playback");
            return Ok(ListenOutcome::Deferred);
        }

        self.recognizer.start(self.recognition_tx.clone()).await?;
        self.listening = true;
        Ok(ListenOutcome::Started)
    }

    /// Cancels any pending listen request and stops recognition.
    ///
    /// Without a working recognizer the locally typed draft is flushed and
    /// returned as the final utterance instead.
    pub async fn stop_listening(&mut self) -> Result<Option<String>, AudioError> {
        self.listen_requested = false;

        if !self.recognizer.is_supported() {
            let typed = std::mem::take(&mut self.typed_buffer);
            let typed = typed.trim();
            return Ok((!typed.is_empty()).then(|| typed.to_string()));
        }

        if self.listening {
            self.listening = false;
            self.interim = None;
            self.recognizer.stop().await?;
        }
        Ok(None)
    }

    /// Replaces the locally typed draft used by the `stop_listening` fallback.
    pub fn buffer_typed(&mut self, text: &str) {
        self.typed_buffer.clear();
        self.typed_buffer.push_str(text);
    }

    /// Waits for the next recognition fragment.
    ///
    /// Fragments that arrive while the interviewer is speaking are discarded.
    /// Empty finals are skipped. Never resolves to `None` while the
    /// coordinator is alive.
    pub async fn next_event(&mut self) -> Option<AudioEvent> {
        loop {
            let fragment = self.recognition_rx.recv().await?;
            if self.is_speaking() {
                debug!("Discarding recognition fragment received during playback");
                continue;
            }
            match fragment {
                Recognition::Interim(text) => {
                    self.interim = Some(text.clone());
                    return Some(AudioEvent::Interim(text));
                }
                Recognition::Final(text) => {
                    self.interim = None;
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    return Some(AudioEvent::Utterance(text.to_string()));
                }
            }
        }
    }

    // ── synthesis ───────────────────────────────────────────────────────────

    /// Suspends listening and hands back the playback future for `text`.
    /// The caller must report completion through `finish_speaking`.
    pub async fn speak(&mut self, text: &str) -> Result<Playback, AudioError> {
        if !self.synthesizer.is_supported() {
            return Err(AudioError::Unsupported(Capability::SpeechSynthesis));
        }

        if self.listening {
            self.listening = false;
            self.interim = None;
            // listen_requested stays set so recognition resumes afterwards.
            if let Err(e) = self.recognizer.stop().await {
                warn!("Failed to suspend recognition before playback: {e}");
                self.recognizer.abort();
            }
        }

        self.active_playbacks += 1;
        let synthesizer = Arc::clone(&self.synthesizer);
        let text = text.to_string();
        Ok(Box::pin(async move { synthesizer.speak(&text).await }))
    }

    /// Marks one playback as finished. When the last one ends, a pending
    /// listen request resumes recognition.
    pub async fn finish_speaking(&mut self) -> Result<(), AudioError> {
        if self.active_playbacks == 0 {
            return Ok(());
        }
        self.active_playbacks -= 1;
        if self.active_playbacks > 0 {
            return Ok(());
        }

        if self.listen_requested
            && !self.listening
            && self.mic == MicState::Active
            && self.recognizer.is_supported()
        {
            self.recognizer.start(self.recognition_tx.clone()).await?;
            self.listening = true;
            debug!("Recognition resumed after playback");
        }
        Ok(())
    }

    /// Speaks `text` and waits for playback to finish.
    pub async fn speak_and_wait(&mut self, text: &str) -> Result<(), AudioError> {
        let playback = self.speak(text).await?;
        let result = playback.await;
        self.finish_speaking().await?;
        result
    }

    // ── teardown ────────────────────────────────────────────────────────────

    /// Releases every handle in one synchronous step.
    pub fn release(&mut self) {
        if self.listening {
            self.recognizer.abort();
        }
        if self.is_speaking() {
            self.synthesizer.cancel();
        }
        if let Some(task) = self.meter_task.take() {
            task.abort();
        }
        if self.mic == MicState::Active {
            self.microphone.release();
        }

        self.listening = false;
        self.listen_requested = false;
        self.active_playbacks = 0;
        self.interim = None;
        self.typed_buffer.clear();
        if self.mic != MicState::Denied {
            self.mic = MicState::Idle;
        }
        let _ = self.level_tx.send(0.0);
    }
}

impl Drop for AudioCoordinator {
    fn drop(&mut self) {
        self.release();
    }
}
