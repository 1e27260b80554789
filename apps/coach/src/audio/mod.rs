//! Audio: capability-scoped ports for microphone capture, speech recognition
//! and speech synthesis, plus the `AudioCoordinator` that arbitrates them.
//!
//! Backends implement the three traits; the coordinator never assumes a
//! vendor. `unsupported` provides the text-only backends used when a runtime
//! has no speech capability at all.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod coordinator;
pub mod meter;
pub mod unsupported;

#[cfg(test)]
pub mod testing;

pub use coordinator::{AudioCoordinator, AudioEvent, ListenOutcome, Playback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Microphone,
    SpeechRecognition,
    SpeechSynthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Microphone => "microphone",
            Capability::SpeechRecognition => "speech recognition",
            Capability::SpeechSynthesis => "speech synthesis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AudioError {
    /// The user or OS refused microphone access. Callers fall back to text input.
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// The runtime has no implementation of this capability.
    #[error("Unsupported capability: {0}")]
    Unsupported(Capability),

    #[error("Invalid audio state: {0}")]
    InvalidState(&'static str),

    #[error("Audio device error: {0}")]
    Device(String),
}

/// A recognition fragment. Interim fragments are provisional and superseded by
/// the next interim or final fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Interim(String),
    Final(String),
}

/// One block of mono samples in [-1.0, 1.0].
pub type SampleFrame = Vec<f32>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCapabilities {
    pub microphone: bool,
    pub speech_recognition: bool,
    pub speech_synthesis: bool,
}

impl AudioCapabilities {
    /// Spoken answers need both a microphone and a recognizer.
    pub fn voice_input(&self) -> bool {
        self.microphone && self.speech_recognition
    }
}

/// Not persisted; lives as long as the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioState {
    pub mic_armed: bool,
    pub listening: bool,
    pub speaking: bool,
    pub current_level: f32,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            mic_armed: false,
            listening: false,
            speaking: false,
            current_level: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioPhase {
    Idle,
    MicRequested,
    MicActive,
    Listening,
    Speaking,
}

#[async_trait]
pub trait MicrophoneProvider: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Requests capture permission and opens the stream. Frames arrive on the
    /// returned channel until `release` is called.
    async fn acquire(&self) -> Result<mpsc::Receiver<SampleFrame>, AudioError>;

    fn release(&self);
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Starts continuous recognition, emitting interim and final fragments
    /// into `sink`.
    async fn start(&self, sink: mpsc::UnboundedSender<Recognition>) -> Result<(), AudioError>;

    async fn stop(&self) -> Result<(), AudioError>;

    /// Immediate, synchronous teardown used during cleanup.
    fn abort(&self);
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Resolves once playback of `text` has finished.
    async fn speak(&self, text: &str) -> Result<(), AudioError>;

    fn cancel(&self);
}

/// The backend set each new interview's coordinator is built from.
#[derive(Clone)]
pub struct AudioBackends {
    pub microphone: Arc<dyn MicrophoneProvider>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AudioBackends {
    /// Text-only deployment: every capability reports unsupported.
    pub fn unsupported() -> Self {
        Self {
            microphone: Arc::new(unsupported::UnsupportedMicrophone),
            recognizer: Arc::new(unsupported::UnsupportedRecognizer),
            synthesizer: Arc::new(unsupported::UnsupportedSynthesizer),
        }
    }

    pub fn coordinator(&self) -> AudioCoordinator {
        AudioCoordinator::new(
            Arc::clone(&self.microphone),
            Arc::clone(&self.recognizer),
            Arc::clone(&self.synthesizer),
        )
    }
}
