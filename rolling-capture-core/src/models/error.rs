use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while running a rolling capture session.
///
/// Only `ConfigurationInvalid`, `DeviceUnavailable`, `InvalidState`,
/// `ThreadSpawnFailed`, `FinalizationFailed` and `Timeout` are ever returned
/// from a command.
/// `SegmentWriteFailed` is reported through the delegate and recovered from;
/// `CompactionFailed` is logged and never leaves the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("segment write failed: {0}")]
    SegmentWriteFailed(String),

    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    #[error("finalization failed: {0}")]
    FinalizationFailed(String),

    #[error("export timed out")]
    Timeout,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("failed to spawn {0}")]
    ThreadSpawnFailed(String),

    #[error("export cancelled")]
    Cancelled,
}

/// Coarse error category delivered with `error(kind, message)` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    ConfigurationInvalid,
    DeviceUnavailable,
    SegmentWriteFailed,
    CompactionFailed,
    FinalizationFailed,
    InvalidState,
    Storage,
    ThreadSpawnFailed,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationInvalid(_) => ErrorKind::ConfigurationInvalid,
            Self::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Self::SegmentWriteFailed(_) => ErrorKind::SegmentWriteFailed,
            Self::CompactionFailed(_) => ErrorKind::CompactionFailed,
            Self::FinalizationFailed(_) | Self::Timeout | Self::Cancelled => {
                ErrorKind::FinalizationFailed
            }
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::StorageError(_) => ErrorKind::Storage,
            Self::ThreadSpawnFailed(_) => ErrorKind::ThreadSpawnFailed,
        }
    }

    pub(crate) fn storage(context: &str, err: std::io::Error) -> Self {
        Self::StorageError(format!("{}: {}", context, err))
    }

    pub(crate) fn thread_spawn(name: &str, err: std::io::Error) -> Self {
        Self::ThreadSpawnFailed(format!("{} thread: {}", name, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_reports_as_finalization_failure() {
        assert_eq!(CaptureError::Timeout.kind(), ErrorKind::FinalizationFailed);
        assert_eq!(CaptureError::Cancelled.kind(), ErrorKind::FinalizationFailed);
    }

    #[test]
    fn display_includes_detail() {
        let err = CaptureError::FinalizationFailed("no valid recorded audio".into());
        assert_eq!(err.to_string(), "finalization failed: no valid recorded audio");
    }

    #[test]
    fn spawn_failure_is_not_a_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::WouldBlock, "resource limit");
        let err = CaptureError::thread_spawn("rolling-rotation", io);
        assert_eq!(err.kind(), ErrorKind::ThreadSpawnFailed);
        assert_eq!(
            err.to_string(),
            "failed to spawn rolling-rotation thread: resource limit"
        );
    }
}
