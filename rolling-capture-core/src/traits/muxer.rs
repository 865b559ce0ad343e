use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::audio_models::{MediaInfo, TimeRange};
use crate::models::error::CaptureError;

/// Cooperative cancellation flag for long-running exports.
///
/// Export APIs are not safely preemptible, so cancellation is only observed
/// between chunks of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once `cancel()` has been called.
    pub fn check(&self) -> Result<(), CaptureError> {
        if self.is_cancelled() {
            Err(CaptureError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The container/muxer collaborator used for compaction and trimming.
pub trait Muxer: Send + Sync {
    /// Append `inputs` end to end, in order, with no gap, into `output`.
    fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError>;

    /// Export `range` of `input` into `output`.
    fn trim(
        &self,
        input: &Path,
        output: &Path,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError>;

    fn probe(&self, path: &Path) -> Result<MediaInfo, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());

        token.cancel();
        assert_eq!(clone.check(), Err(CaptureError::Cancelled));
    }
}
