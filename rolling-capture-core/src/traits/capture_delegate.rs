use crate::models::error::CaptureError;
use crate::models::file_descriptor::FileDescriptor;
use crate::models::state::{CaptureState, StateMetadata};

/// Event sink for rolling capture notifications.
///
/// Methods are called from inside the session's serialized context (a
/// command, a rotation tick, or a timer thread). Implementations must not
/// call back into the recorder; marshal to another thread if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &CaptureState, metadata: &StateMetadata);

    /// Called about once per second while recording, in whole seconds.
    fn on_duration_changed(&self, seconds: u64);

    /// Called for errors the session recovered from, and for failed stops.
    fn on_error(&self, error: &CaptureError);

    /// Diagnostic: a segment was sealed and appended to the ledger.
    fn on_segment_completed(&self, index: u64, duration_secs: f64);

    /// Called when `stop()` produced its output file.
    fn on_capture_finished(&self, file: &FileDescriptor);
}
