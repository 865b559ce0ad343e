use std::path::Path;

use crate::models::audio_models::{AudioFormat, EncodedFile};
use crate::models::error::CaptureError;

/// The per-segment encoder collaborator.
pub trait SegmentEncoder: Send + Sync {
    /// Create `path` and return a writer accepting interleaved 16-bit samples.
    fn open(
        &self,
        path: &Path,
        format: &AudioFormat,
    ) -> Result<Box<dyn SegmentWriter>, CaptureError>;

    /// Extension used for every file this encoder produces (no dot).
    fn file_extension(&self) -> &str;

    fn mime_type(&self) -> &str;
}

/// One open output file.
///
/// A finished file cannot be reopened for append; resuming after a pause
/// always opens a new writer on a new path.
pub trait SegmentWriter: Send {
    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError>;

    /// Sample frames accepted so far.
    fn frames_written(&self) -> u64;

    fn path(&self) -> &Path;

    /// Flush the encoder and seal the file.
    fn finish(self: Box<Self>) -> Result<EncodedFile, CaptureError>;

    /// Close without sealing and delete the partial file.
    fn abandon(self: Box<Self>);
}
