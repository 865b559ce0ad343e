use crate::models::audio_models::SessionDiagnostics;
use crate::models::config::RollingConfiguration;
use crate::models::error::CaptureError;
use crate::models::file_descriptor::FileDescriptor;
use crate::models::state::SessionStatus;

/// Command surface of a rolling capture session, as driven by the bridge.
pub trait CaptureSession: Send + Sync {
    /// Start a new session. Fails if one is already active.
    /// Transitions: idle → recording.
    fn start(&self, config: RollingConfiguration) -> Result<(), CaptureError>;

    /// Transitions: recording → paused.
    fn pause(&self) -> Result<(), CaptureError>;

    /// Transitions: paused → recording.
    fn resume(&self) -> Result<(), CaptureError>;

    /// Drop all retained audio and counters, keeping the device open.
    /// Transitions: recording/paused → paused.
    fn reset(&self) -> Result<(), CaptureError>;

    /// Finalize the retention window into one file.
    /// Transitions: recording/paused → stopping → idle.
    fn stop(&self) -> Result<FileDescriptor, CaptureError>;

    fn status(&self) -> SessionStatus;

    /// Recorded duration in whole seconds, excluding paused time.
    fn duration(&self) -> u64;

    fn diagnostics(&self) -> SessionDiagnostics;
}
