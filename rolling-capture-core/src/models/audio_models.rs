use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Output audio format shared by every segment of a session.
///
/// Segments of one session always share a format, which is what makes
/// gapless concatenation lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

impl AudioFormat {
    /// Interleaved samples that make up `duration` of audio.
    pub fn samples_for(&self, duration: Duration) -> usize {
        let frames = (duration.as_secs_f64() * self.sample_rate as f64).round() as usize;
        frames * self.channels as usize
    }

    /// Duration of `frames` sample frames.
    pub fn duration_of_frames(&self, frames: u64) -> Duration {
        frames_to_duration(frames, self.sample_rate)
    }
}

/// Exact duration of `frames` at `sample_rate`, in whole nanoseconds.
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    let nanos = frames as u128 * 1_000_000_000 / sample_rate.max(1) as u128;
    Duration::from_nanos(nanos as u64)
}

/// What a muxer reports about a finished file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaInfo {
    pub duration: Duration,
    pub size_bytes: u64,
}

/// A sealed file produced by a `SegmentWriter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFile {
    pub path: PathBuf,
    pub duration: Duration,
    pub size_bytes: u64,
    pub frames: u64,
}

/// A half-open time range `[start, end)` within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Duration,
    pub end: Duration,
}

impl TimeRange {
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    /// The last `length` of a file lasting `total`.
    pub fn tail(total: Duration, length: Duration) -> Self {
        Self {
            start: total.saturating_sub(length),
            end: total,
        }
    }

    pub fn length(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// An audio input device as described by a `CaptureProvider`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Counters for debugging a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDiagnostics {
    pub segments_completed: u64,
    pub segments_evicted: u64,
    pub segments_abandoned: u64,
    pub segment_write_failures: u64,
    pub compaction_runs: u64,
    pub compaction_publishes: u64,
    pub compaction_failures: u64,
    pub frames_written: u64,
    pub frames_dropped: u64,
}
