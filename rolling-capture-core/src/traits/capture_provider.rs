use std::sync::Arc;

use crate::models::audio_models::InputDevice;
use crate::models::error::CaptureError;

/// Callback invoked when the input device has captured a buffer.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples in `[-1.0, 1.0]`.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// The audio-input collaborator: owns the hardware capture device.
///
/// The engine starts it once per session and stops it only on `stop()` or
/// teardown, so pause and reset never release the device.
pub trait CaptureProvider: Send {
    /// Whether the device can currently be opened.
    fn is_available(&self) -> bool;

    /// Start capturing, delivering buffers via `callback`.
    ///
    /// The callback fires on the device's audio thread; the engine only
    /// converts and queues the samples there.
    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<(), CaptureError>;

    fn device_info(&self) -> InputDevice;
}
