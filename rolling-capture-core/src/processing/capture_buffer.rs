use std::collections::VecDeque;
use std::time::Duration;

use crate::models::audio_models::AudioFormat;

/// Bounded hand-off queue between the device callback and the writers.
///
/// The callback pushes converted 16-bit frames; the session drains them into
/// the active writer(s) on the processing tick and before every rotation,
/// pause and stop. Wrap in `Arc<parking_lot::Mutex<_>>` for cross-thread use.
///
/// Overflow drops the oldest whole frames, so channels never get out of step.
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: VecDeque<i16>,
    channels: usize,
    capacity_frames: usize,
    dropped_frames: u64,
}

impl CaptureBuffer {
    pub fn new(format: &AudioFormat, capacity: Duration) -> Self {
        let channels = format.channels.max(1) as usize;
        let capacity_frames = (format.samples_for(capacity) / channels).max(1);
        Self {
            samples: VecDeque::with_capacity(capacity_frames * channels),
            channels,
            capacity_frames,
            dropped_frames: 0,
        }
    }

    /// Queue interleaved samples. A trailing partial frame is ignored.
    pub fn push(&mut self, samples: &[i16]) {
        let whole = samples.len() - samples.len() % self.channels;
        let mut samples = &samples[..whole];
        if samples.is_empty() {
            return;
        }

        let capacity = self.capacity_frames * self.channels;
        if samples.len() > capacity {
            let skipped = samples.len() - capacity;
            self.dropped_frames += (skipped / self.channels) as u64;
            samples = &samples[skipped..];
        }

        let overflow = (self.samples.len() + samples.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
            self.dropped_frames += (overflow / self.channels) as u64;
        }

        self.samples.extend(samples.iter().copied());
    }

    /// Remove and return everything queued.
    pub fn drain(&mut self) -> Vec<i16> {
        self.samples.drain(..).collect()
    }

    /// Discard everything queued, returning the number of frames discarded.
    pub fn clear(&mut self) -> usize {
        let frames = self.len_frames();
        self.samples.clear();
        frames
    }

    pub fn len_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frames lost to overflow since creation.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }
}
