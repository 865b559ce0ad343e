use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::engine::Engine;
use super::ticker::Ticker;
use crate::models::audio_models::{InputDevice, SessionDiagnostics};
use crate::models::config::{RecordingOptions, RollingConfiguration};
use crate::models::error::CaptureError;
use crate::models::file_descriptor::FileDescriptor;
use crate::models::state::{CaptureState, SessionStatus};
use crate::processing::wav_codec::{WavEncoder, WavMuxer};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::CaptureProvider;
use crate::traits::capture_session::CaptureSession;
use crate::traits::clock::{Clock, SystemClock};
use crate::traits::encoder::SegmentEncoder;
use crate::traits::muxer::Muxer;

/// How often captured frames are drained into the segment writer.
const PROCESSING_INTERVAL: Duration = Duration::from_millis(100);

/// How often `on_duration_changed` fires while recording.
const DURATION_INTERVAL: Duration = Duration::from_secs(1);

/// Timers that should be running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerPlan {
    recording: bool,
    rotation: Option<(u64, Duration)>,
}

impl TimerPlan {
    fn of(engine: &Engine) -> Self {
        let rotation = engine.rotation_epoch().zip(engine.segment_duration());
        Self {
            recording: engine.state().is_recording(),
            rotation,
        }
    }
}

#[derive(Default)]
struct Timers {
    processing: Option<Ticker>,
    duration: Option<Ticker>,
    rotation: Option<(u64, Ticker)>,
}

impl Timers {
    fn stop_all(&mut self) {
        if let Some(ticker) = self.processing.take() {
            ticker.stop();
        }
        if let Some(ticker) = self.duration.take() {
            ticker.stop();
        }
        if let Some((_, ticker)) = self.rotation.take() {
            ticker.stop();
        }
    }
}

/// Thread-safe rolling capture session driven by wall-clock timers.
///
/// Wraps an [`Engine`] in a `parking_lot::Mutex` and runs three tickers
/// while recording: frame processing, duration events and segment rotation.
/// Every command takes the timer lock before the engine lock, and tickers are
/// only stopped after the engine lock has been released, so a ticker blocked
/// on the engine can always be joined.
///
/// ```text
/// [CaptureProvider] ─callback→ Engine ←pump── processing ticker (100 ms)
///                                     ←tick── rotation ticker (segment duration)
///                                     ←emit── duration ticker (1 s)
/// ```
pub struct RollingRecorder {
    engine: Arc<Mutex<Engine>>,
    timers: Mutex<Timers>,
}

impl RollingRecorder {
    /// A recorder writing PCM WAV segments, timed by the system clock.
    pub fn new(provider: Box<dyn CaptureProvider>) -> Self {
        Self::with_parts(
            provider,
            Arc::new(WavEncoder),
            Arc::new(WavMuxer),
            Arc::new(SystemClock::new()),
        )
    }

    pub fn with_parts(
        provider: Box<dyn CaptureProvider>,
        encoder: Arc<dyn SegmentEncoder>,
        muxer: Arc<dyn Muxer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = Arc::new(Mutex::new(Engine::new(provider, encoder, muxer, clock)));

        let weak: Weak<Mutex<Engine>> = Arc::downgrade(&engine);
        engine.lock().set_finish_notify(Arc::new(move || {
            // Skipped while a command holds the engine; it collects itself.
            if let Some(engine) = weak.upgrade() {
                if let Some(mut engine) = engine.try_lock() {
                    engine.collect_finished();
                }
            }
        }));

        Self {
            engine,
            timers: Mutex::new(Timers::default()),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        self.engine.lock().set_delegate(delegate);
    }

    /// Start with bridge-supplied options layered over `base`.
    pub fn start_with_options(
        &self,
        options: &RecordingOptions,
        base: RollingConfiguration,
    ) -> Result<(), CaptureError> {
        let config = options.apply_to(base)?;
        self.start(config)
    }

    pub fn begin_interruption(&self) -> Result<(), CaptureError> {
        self.command(|engine| engine.begin_interruption())
    }

    pub fn end_interruption(&self) -> Result<(), CaptureError> {
        self.command(|engine| engine.end_interruption())
    }

    pub fn input_device(&self) -> Option<InputDevice> {
        self.engine.lock().input_device()
    }

    pub fn state(&self) -> CaptureState {
        self.engine.lock().state().clone()
    }

    /// Run `f` against the engine, then bring the timers in line with the
    /// state it left behind.
    fn command<T>(&self, f: impl FnOnce(&mut Engine) -> T) -> T {
        let mut timers = self.timers.lock();
        let (result, plan) = {
            let mut engine = self.engine.lock();
            let result = f(&mut *engine);
            (result, TimerPlan::of(&engine))
        };
        self.sync_timers(&mut timers, plan);
        result
    }

    fn sync_timers(&self, timers: &mut Timers, plan: TimerPlan) {
        if !plan.recording {
            timers.stop_all();
            return;
        }

        if timers.processing.is_none() {
            timers.processing = self.spawn("rolling-processing", PROCESSING_INTERVAL, |engine| {
                engine.pump()
            });
        }
        if timers.duration.is_none() {
            timers.duration = self.spawn("rolling-duration", DURATION_INTERVAL, |engine| {
                engine.emit_duration()
            });
        }

        let current = timers.rotation.as_ref().map(|(epoch, _)| *epoch);
        if current != plan.rotation.map(|(epoch, _)| epoch) {
            if let Some((_, ticker)) = timers.rotation.take() {
                ticker.stop();
            }
            if let Some((epoch, period)) = plan.rotation {
                timers.rotation = self
                    .spawn("rolling-rotation", period, move |engine| {
                        engine.on_rotation_tick(epoch)
                    })
                    .map(|ticker| (epoch, ticker));
            }
        }
    }

    fn spawn<F>(&self, name: &str, period: Duration, tick: F) -> Option<Ticker>
    where
        F: Fn(&mut Engine) + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        match Ticker::spawn(name, period, move || tick(&mut *engine.lock())) {
            Ok(ticker) => Some(ticker),
            Err(e) => {
                log::error!("{}", e);
                None
            }
        }
    }
}

impl CaptureSession for RollingRecorder {
    fn start(&self, config: RollingConfiguration) -> Result<(), CaptureError> {
        self.command(|engine| engine.start(config))
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.command(|engine| engine.pause())
    }

    fn resume(&self) -> Result<(), CaptureError> {
        self.command(|engine| engine.resume())
    }

    fn reset(&self) -> Result<(), CaptureError> {
        self.command(|engine| engine.reset())
    }

    fn stop(&self) -> Result<FileDescriptor, CaptureError> {
        self.command(|engine| engine.stop())
    }

    fn status(&self) -> SessionStatus {
        self.engine.lock().status()
    }

    fn duration(&self) -> u64 {
        self.engine.lock().duration()
    }

    fn diagnostics(&self) -> SessionDiagnostics {
        self.engine.lock().diagnostics()
    }
}

impl Drop for RollingRecorder {
    fn drop(&mut self) {
        self.timers.get_mut().stop_all();
        self.engine.lock().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file_descriptor::OutputSource;
    use crate::test_support::{count_files, scripted_provider, ProviderHandle, RecordingDelegate};
    use approx::assert_abs_diff_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, JoinHandle};
    use tempfile::TempDir;

    const RATE: u32 = 8_000;
    const CHUNK: Duration = Duration::from_millis(10);

    /// Pushes 10 ms of audio every 10 ms until dropped.
    struct Feeder {
        running: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    impl Feeder {
        fn start(input: ProviderHandle) -> Self {
            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);
            let handle = thread::spawn(move || {
                let chunk = vec![0.25f32; RATE as usize / 100];
                while flag.load(Ordering::SeqCst) {
                    input.push(&chunk, RATE as f64, 1);
                    thread::sleep(CHUNK);
                }
            });
            Self {
                running,
                handle: Some(handle),
            }
        }
    }

    impl Drop for Feeder {
        fn drop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                handle.join().unwrap();
            }
        }
    }

    fn config(dir: &TempDir) -> RollingConfiguration {
        RollingConfiguration {
            sample_rate: RATE,
            channels: 1,
            segment_duration: Duration::from_millis(100),
            retention_window: Some(Duration::from_millis(300)),
            scratch_directory: dir.path().join("scratch"),
            output_directory: dir.path().join("out"),
            ..Default::default()
        }
    }

    fn recorder() -> (RollingRecorder, ProviderHandle, Arc<RecordingDelegate>) {
        let (provider, input) = scripted_provider();
        let recorder = RollingRecorder::new(Box::new(provider));
        let delegate = Arc::new(RecordingDelegate::default());
        recorder.set_delegate(delegate.clone());
        (recorder, input, delegate)
    }

    #[test]
    fn timers_rotate_and_stop_returns_the_window() {
        let dir = TempDir::new().unwrap();
        let (recorder, input, delegate) = recorder();

        recorder.start(config(&dir)).unwrap();
        let feeder = Feeder::start(input.clone());
        thread::sleep(Duration::from_millis(800));

        let file = recorder.stop().unwrap();
        drop(feeder);

        assert_abs_diff_eq!(file.duration_seconds, 0.3, epsilon = 0.05);
        assert!(delegate.segments().len() >= 3);
        assert!(recorder.diagnostics().segments_evicted >= 1);
        assert_eq!(input.stops(), 1);
        assert_eq!(count_files(&dir.path().join("scratch")), 0);
        assert!(matches!(
            file.source,
            OutputSource::CompactionCandidate | OutputSource::TailMerge
        ));
    }

    #[test]
    fn status_follows_commands() {
        let dir = TempDir::new().unwrap();
        let (recorder, input, _delegate) = recorder();
        let session: &dyn CaptureSession = &recorder;

        assert_eq!(session.status(), SessionStatus::Idle);
        session.start(config(&dir)).unwrap();
        assert_eq!(session.status(), SessionStatus::Recording);

        let feeder = Feeder::start(input);
        thread::sleep(Duration::from_millis(250));

        session.pause().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        session.resume().unwrap();
        assert_eq!(session.status(), SessionStatus::Recording);
        session.reset().unwrap();
        assert_eq!(session.status(), SessionStatus::Paused);
        assert_eq!(session.duration(), 0);

        session.resume().unwrap();
        thread::sleep(Duration::from_millis(250));
        let file = session.stop().unwrap();
        drop(feeder);

        assert!(file.duration_seconds > 0.0);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(matches!(session.stop(), Err(CaptureError::InvalidState(_))));
    }

    #[test]
    fn start_with_options_overrides_the_base() {
        let dir = TempDir::new().unwrap();
        let (recorder, _input, _delegate) = recorder();
        let options: RecordingOptions = serde_json::from_str(
            r#"{"sampleRate": 16000, "channelCount": 2, "segmentDuration": 0.5}"#,
        )
        .unwrap();

        recorder.start_with_options(&options, config(&dir)).unwrap();
        assert_eq!(recorder.status(), SessionStatus::Recording);
        recorder.pause().unwrap();

        let err = recorder.stop().unwrap_err();
        assert!(matches!(err, CaptureError::FinalizationFailed(_)));
    }

    #[test]
    fn start_with_huge_window_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (recorder, input, _delegate) = recorder();
        let options: RecordingOptions =
            serde_json::from_str(r#"{"retentionWindow": 1e300}"#).unwrap();

        let err = recorder.start_with_options(&options, config(&dir)).unwrap_err();
        assert!(matches!(err, CaptureError::ConfigurationInvalid(_)));
        assert_eq!(recorder.status(), SessionStatus::Idle);
        assert_eq!(input.starts(), 0);
    }

    #[test]
    fn interruptions_pause_and_resume() {
        let dir = TempDir::new().unwrap();
        let (recorder, _input, _delegate) = recorder();

        recorder.start(config(&dir)).unwrap();
        recorder.begin_interruption().unwrap();
        assert_eq!(recorder.status(), SessionStatus::Paused);
        recorder.end_interruption().unwrap();
        assert!(recorder.state().is_recording());
    }

    #[test]
    fn duration_events_tick_once_a_second() {
        let dir = TempDir::new().unwrap();
        let (recorder, input, delegate) = recorder();

        recorder.start(config(&dir)).unwrap();
        let feeder = Feeder::start(input);
        thread::sleep(Duration::from_millis(1_300));
        recorder.pause().unwrap();
        drop(feeder);

        assert_eq!(delegate.durations(), vec![1]);
        assert_eq!(recorder.duration(), 1);
    }

    #[test]
    fn dropping_the_recorder_releases_everything() {
        let dir = TempDir::new().unwrap();
        let (recorder, input, _delegate) = recorder();

        recorder.start(config(&dir)).unwrap();
        let feeder = Feeder::start(input.clone());
        thread::sleep(Duration::from_millis(250));
        drop(recorder);
        drop(feeder);

        assert_eq!(input.stops(), 1);
        assert!(!input.is_capturing());
        assert_eq!(count_files(&dir.path().join("scratch")), 0);
    }

    #[test]
    fn input_device_reports_availability() {
        let (recorder, input, _delegate) = recorder();
        assert_eq!(recorder.input_device().unwrap().name, "Scripted Microphone");
        input.set_available(false);
        assert!(recorder.input_device().is_none());
    }
}
