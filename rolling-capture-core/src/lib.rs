//! # rolling-capture-core
//!
//! Rolling-window audio capture engine.
//!
//! Records microphone audio as a chain of short, independently sealed
//! segments, keeps only as many as the retention window needs, and on stop
//! produces a single file holding the last `window` of recorded audio.
//! Platform audio backends implement the `CaptureProvider` trait; encoders
//! and muxers plug in through `SegmentEncoder` and `Muxer`, with PCM WAV
//! implementations bundled.
//!
//! ## Architecture
//!
//! ```text
//! rolling-capture-core (this crate)
//! ├── traits/       ← CaptureProvider, CaptureSession, CaptureDelegate, SegmentEncoder, Muxer, Clock
//! ├── models/       ← CaptureError, CaptureState, RollingConfiguration, FileDescriptor, etc.
//! ├── processing/   ← FrameConverter, CaptureBuffer, WAV codec
//! ├── rolling/      ← RotationController, SegmentLedger, CompactionEngine, WindowFinalizer
//! ├── session/      ← Engine (state machine), RollingRecorder (timers + locking)
//! └── storage/      ← scratch directories, output delivery, metadata sidecar
//! ```

pub mod models;
pub mod processing;
pub mod rolling;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioFormat, InputDevice, SessionDiagnostics};
pub use models::config::{RecordingOptions, RollingConfiguration, RollingFeatures};
pub use models::error::{CaptureError, ErrorKind};
pub use models::file_descriptor::{FileDescriptor, OutputSource};
pub use models::state::{CaptureState, SessionStatus, StateMetadata};
pub use processing::wav_codec::{WavEncoder, WavMuxer};
pub use session::engine::Engine;
pub use session::recorder::RollingRecorder;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_provider::{AudioBufferCallback, CaptureProvider};
pub use traits::capture_session::CaptureSession;
pub use traits::clock::{Clock, SystemClock};
pub use traits::encoder::{SegmentEncoder, SegmentWriter};
pub use traits::muxer::{CancelToken, Muxer};
