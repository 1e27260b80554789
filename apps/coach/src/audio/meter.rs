//! Input level metering: RMS over a fixed-size rolling window of samples.

use std::collections::VecDeque;

use tokio::sync::{mpsc, watch};

use crate::audio::SampleFrame;

/// Samples kept in the rolling window.
pub const METER_WINDOW: usize = 1024;

/// Scales RMS into a UI-friendly range; conversational speech sits around
/// 0.05–0.2 RMS.
const METER_GAIN: f32 = 4.0;

pub struct LevelMeter {
    window: VecDeque<f32>,
    capacity: usize,
    sum_squares: f64,
}

impl LevelMeter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum_squares: 0.0,
        }
    }

    /// Pushes a frame and returns the normalized level in [0, 1].
    pub fn push_frame(&mut self, frame: &[f32]) -> f32 {
        for &sample in frame {
            let sample = if sample.is_finite() { sample } else { 0.0 };
            if self.window.len() == self.capacity {
                if let Some(old) = self.window.pop_front() {
                    self.sum_squares -= (old as f64) * (old as f64);
                }
            }
            self.window.push_back(sample);
            self.sum_squares += (sample as f64) * (sample as f64);
        }
        self.level()
    }

    pub fn level(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        // Running subtraction can drift slightly below zero.
        let mean_square = (self.sum_squares / self.window.len() as f64).max(0.0);
        let rms = mean_square.sqrt() as f32;
        (rms * METER_GAIN).clamp(0.0, 1.0)
    }
}

/// Drains microphone frames into the meter until the stream closes, then
/// reports silence.
pub async fn run_meter(mut frames: mpsc::Receiver<SampleFrame>, level_tx: watch::Sender<f32>) {
    let mut meter = LevelMeter::new(METER_WINDOW);
    while let Some(frame) = frames.recv().await {
        let level = meter.push_frame(&frame);
        let _ = level_tx.send(level);
    }
    let _ = level_tx.send(0.0);
}
