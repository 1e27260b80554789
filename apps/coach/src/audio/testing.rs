//! In-process fakes for the audio ports.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::audio::{
    AudioError, MicrophoneProvider, Recognition, SampleFrame, SpeechRecognizer, SpeechSynthesizer,
};

pub struct FakeMicrophone {
    deny: bool,
    acquire_calls: AtomicUsize,
    released: AtomicBool,
    frames: Mutex<Option<mpsc::Sender<SampleFrame>>>,
}

impl FakeMicrophone {
    pub fn granting() -> Self {
        Self::with_permission(false)
    }

    pub fn denying() -> Self {
        Self::with_permission(true)
    }

    fn with_permission(deny: bool) -> Self {
        Self {
            deny,
            acquire_calls: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            frames: Mutex::new(None),
        }
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub async fn push_frame(&self, frame: SampleFrame) {
        let sender = self.frames.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(frame).await;
        }
    }
}

#[async_trait]
impl MicrophoneProvider for FakeMicrophone {
    fn is_supported(&self) -> bool {
        true
    }

    async fn acquire(&self) -> Result<mpsc::Receiver<SampleFrame>, AudioError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            return Err(AudioError::PermissionDenied);
        }
        let (tx, rx) = mpsc::channel(16);
        *self.frames.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.frames.lock().unwrap().take();
    }
}

/// Keeps the last sink it was started with, so tests can inject fragments
/// that arrive after `stop` the way real engines deliver late results.
pub struct FakeRecognizer {
    start_calls: AtomicUsize,
    running: AtomicBool,
    sink: Mutex<Option<mpsc::UnboundedSender<Recognition>>>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self {
            start_calls: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            sink: Mutex::new(None),
        }
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn emit(&self, fragment: Recognition) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(fragment);
        }
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    async fn start(&self, sink: mpsc::UnboundedSender<Recognition>) -> Result<(), AudioError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn abort(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// `manual` playbacks block until `complete_one`; `instant` ones finish
/// immediately.
pub struct FakeSynthesizer {
    gate: Option<Arc<Semaphore>>,
    spoken: Mutex<Vec<String>>,
    cancelled: AtomicBool,
}

impl FakeSynthesizer {
    pub fn manual() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            spoken: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn instant() -> Self {
        Self {
            gate: None,
            spoken: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn complete_one(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    fn is_supported(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str) -> Result<(), AudioError> {
        self.spoken.lock().unwrap().push(text.to_string());
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| AudioError::Device("synthesizer closed".into()))?;
            permit.forget();
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
