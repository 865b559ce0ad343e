use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use super::audio_models::AudioFormat;
use super::error::CaptureError;

/// Largest safety pad the finalizer may take in front of the trim point.
pub const MAX_TRIM_SAFETY_PAD: Duration = Duration::from_millis(100);

const MIN_SEGMENT_DURATION: Duration = Duration::from_millis(100);
const MAX_SEGMENT_DURATION: Duration = Duration::from_secs(60);
const MAX_RETENTION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Engine feature switches. One engine covers every variant of the rolling
/// buffer; these select which finalization sources it maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingFeatures {
    /// Keep a second writer that records the whole session into one file.
    pub continuous_writer: bool,

    /// Merge the ledger window in the background after every append.
    pub compaction: bool,

    /// Crop the padded trim export down to the exact window length.
    pub exact_trim: bool,
}

impl Default for RollingFeatures {
    fn default() -> Self {
        Self {
            continuous_writer: false,
            compaction: true,
            exact_trim: true,
        }
    }
}

/// Configuration for a rolling capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingConfiguration {
    /// Output sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Output channel count, 1 or 2 (default: 1).
    pub channels: u16,

    /// Target bitrate in bits per second for compressed encoders (default: 128000).
    pub bitrate: u32,

    /// Length of one segment (default: 1s).
    pub segment_duration: Duration,

    /// How much audio `stop()` returns, counted back from now.
    /// None keeps everything.
    pub retention_window: Option<Duration>,

    /// Hard ceiling on retained segments when no retention window is set.
    pub max_segments: Option<usize>,

    /// Parent directory for per-session scratch files.
    pub scratch_directory: PathBuf,

    /// Directory that receives the final output file.
    pub output_directory: PathBuf,

    pub features: RollingFeatures,

    /// Upper bound on the stop-time merge/trim export.
    pub finalize_timeout: Duration,

    /// Extra audio exported in front of the trim point to absorb encoder priming.
    pub trim_safety_pad: Duration,

    /// Write `{output}.metadata.json` next to the final output.
    pub write_metadata_sidecar: bool,
}

impl RollingConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(format!("unsupported sample rate: {}", self.sample_rate));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.bitrate == 0 {
            return Err("bitrate must be positive".into());
        }
        if self.segment_duration < MIN_SEGMENT_DURATION
            || self.segment_duration > MAX_SEGMENT_DURATION
        {
            return Err(format!(
                "segment duration must be between {:?} and {:?}, got {:?}",
                MIN_SEGMENT_DURATION, MAX_SEGMENT_DURATION, self.segment_duration
            ));
        }
        if let Some(window) = self.retention_window {
            if window.is_zero() {
                return Err("retention window must be positive".into());
            }
            if window > MAX_RETENTION_WINDOW {
                return Err(format!(
                    "retention window must not exceed {:?}, got {:?}",
                    MAX_RETENTION_WINDOW, window
                ));
            }
        }
        if self.max_segments == Some(0) {
            return Err("max segments must be at least 1".into());
        }
        if self.finalize_timeout.is_zero() {
            return Err("finalize timeout must be positive".into());
        }
        if self.trim_safety_pad > MAX_TRIM_SAFETY_PAD {
            return Err(format!(
                "trim safety pad must not exceed {:?}",
                MAX_TRIM_SAFETY_PAD
            ));
        }
        Ok(())
    }

    /// Validate and clamp. A segment longer than the retention window would
    /// force exact trimming to cut inside a single segment, so the segment
    /// duration is clamped down to the window.
    pub fn normalized(mut self) -> Result<Self, CaptureError> {
        self.validate().map_err(CaptureError::ConfigurationInvalid)?;
        if let Some(window) = self.retention_window {
            if self.segment_duration > window {
                log::warn!(
                    "segment duration {:?} exceeds retention window {:?}; clamping",
                    self.segment_duration,
                    window
                );
                self.segment_duration = window.max(MIN_SEGMENT_DURATION);
            }
        }
        Ok(self)
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bitrate: self.bitrate,
        }
    }
}

impl Default for RollingConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            bitrate: 128_000,
            segment_duration: Duration::from_secs(1),
            retention_window: None,
            max_segments: None,
            scratch_directory: std::env::temp_dir().join("rolling-capture"),
            output_directory: PathBuf::from("."),
            features: RollingFeatures::default(),
            finalize_timeout: Duration::from_secs(30),
            trim_safety_pad: MAX_TRIM_SAFETY_PAD,
            write_metadata_sidecar: false,
        }
    }
}

/// `start(config)` parameters as delivered by the plugin bridge.
///
/// Durations are in seconds. Missing fields keep the base configuration's value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub bitrate: Option<u32>,
    pub segment_duration: Option<f64>,
    pub retention_window: Option<f64>,
}

impl RecordingOptions {
    pub fn apply_to(
        &self,
        mut base: RollingConfiguration,
    ) -> Result<RollingConfiguration, CaptureError> {
        if let Some(rate) = self.sample_rate {
            base.sample_rate = rate;
        }
        if let Some(channels) = self.channel_count {
            base.channels = channels;
        }
        if let Some(bitrate) = self.bitrate {
            base.bitrate = bitrate;
        }
        if let Some(secs) = self.segment_duration {
            base.segment_duration = seconds("segmentDuration", secs)?;
        }
        if let Some(secs) = self.retention_window {
            base.retention_window = Some(seconds("retentionWindow", secs)?);
        }
        Ok(base)
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration, CaptureError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CaptureError::ConfigurationInvalid(format!(
            "{} must be a positive number of seconds, got {}",
            field, secs
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        CaptureError::ConfigurationInvalid(format!("{} of {} seconds: {}", field, secs, e))
    })
}
