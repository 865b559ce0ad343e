use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_models::AudioFormat;

/// Which finalization source produced the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputSource {
    /// The continuous full-session writer.
    ContinuousWriter,
    /// The latest compaction candidate, plus any segments sealed after it.
    CompactionCandidate,
    /// A merge of the ledger tail performed at stop time.
    TailMerge,
}

/// The file handed back to the caller by `stop()`.
///
/// Serialized in camelCase for the plugin bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub uri: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Rounded to one decimal place.
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate: u32,
    pub created_at_epoch_millis: i64,
    /// SHA-256 of the file contents, lowercase hex.
    pub checksum: String,
    pub source: OutputSource,
}

impl FileDescriptor {
    pub fn new(
        path: &Path,
        mime_type: &str,
        size_bytes: u64,
        duration: Duration,
        format: &AudioFormat,
        checksum: String,
        source: OutputSource,
    ) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            uri: format!("file://{}", path.display()),
            filename,
            mime_type: mime_type.to_string(),
            size_bytes,
            duration_seconds: round_to_tenth(duration.as_secs_f64()),
            sample_rate: format.sample_rate,
            channel_count: format.channels,
            bitrate: format.bitrate,
            created_at_epoch_millis: chrono::Utc::now().timestamp_millis(),
            checksum,
            source,
        }
    }
}

fn round_to_tenth(secs: f64) -> f64 {
    (secs * 10.0).round() / 10.0
}
