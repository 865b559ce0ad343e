use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::audio_models::EncodedFile;
use crate::storage::scratch;

/// A sealed, file-backed slice of the capture stream.
///
/// Segments are never mutated after creation. The file is deleted when the
/// segment is evicted from the ledger or the session is torn down.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Monotonic sequence index within the session.
    pub index: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl Segment {
    pub fn from_encoded(index: u64, started_at: DateTime<Utc>, file: EncodedFile) -> Self {
        Self {
            index,
            started_at,
            duration: file.duration,
            path: file.path,
            size_bytes: file.size_bytes,
        }
    }

    pub fn delete_file(&self) {
        scratch::remove_quietly(&self.path);
    }
}
