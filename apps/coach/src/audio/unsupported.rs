//! Backends for runtimes without audio. Every capability reports itself as
//! unsupported so sessions run in text-only mode.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{
    AudioError, Capability, MicrophoneProvider, Recognition, SampleFrame, SpeechRecognizer,
    SpeechSynthesizer,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedMicrophone;

#[async_trait]
impl MicrophoneProvider for UnsupportedMicrophone {
    fn is_supported(&self) -> bool {
        false
    }

    async fn acquire(&self) -> Result<mpsc::Receiver<SampleFrame>, AudioError> {
        Err(AudioError::Unsupported(Capability::Microphone))
    }

    fn release(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn start(&self, _sink: mpsc::UnboundedSender<Recognition>) -> Result<(), AudioError> {
        Err(AudioError::Unsupported(Capability::SpeechRecognition))
    }

    async fn stop(&self) -> Result<(), AudioError> {
        Ok(())
    }

    fn abort(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedSynthesizer;

#[async_trait]
impl SpeechSynthesizer for UnsupportedSynthesizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn speak(&self, _text: &str) -> Result<(), AudioError> {
        Err(AudioError::Unsupported(Capability::SpeechSynthesis))
    }

    fn cancel(&self) {}
}
