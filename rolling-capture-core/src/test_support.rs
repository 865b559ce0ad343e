//! Test doubles shared by the unit tests.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::audio_models::{AudioFormat, EncodedFile, InputDevice, MediaInfo, TimeRange};
use crate::models::error::CaptureError;
use crate::models::file_descriptor::FileDescriptor;
use crate::models::state::{CaptureState, StateMetadata};
use crate::processing::wav_codec::{WavEncoder, WavMuxer};
use crate::processing::wav_format;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::{AudioBufferCallback, CaptureProvider};
use crate::traits::clock::Clock;
use crate::traits::encoder::{SegmentEncoder, SegmentWriter};
use crate::traits::muxer::{CancelToken, Muxer};

/// A clock that only moves when told to.
#[derive(Default)]
pub(crate) struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Duration::from_secs(1_000)),
        })
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

#[derive(Default)]
struct ProviderShared {
    callback: Mutex<Option<AudioBufferCallback>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    unavailable: AtomicBool,
    fail_start: AtomicBool,
}

/// A provider whose audio is pushed by the test through a [`ProviderHandle`].
pub(crate) struct ScriptedProvider {
    shared: Arc<ProviderShared>,
}

#[derive(Clone)]
pub(crate) struct ProviderHandle {
    shared: Arc<ProviderShared>,
}

pub(crate) fn scripted_provider() -> (ScriptedProvider, ProviderHandle) {
    let shared = Arc::new(ProviderShared::default());
    (
        ScriptedProvider {
            shared: Arc::clone(&shared),
        },
        ProviderHandle { shared },
    )
}

impl ProviderHandle {
    /// Deliver a device buffer. Returns false when capture is not running.
    pub(crate) fn push(&self, samples: &[f32], sample_rate: f64, channels: u16) -> bool {
        let callback = self.shared.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback(samples, sample_rate, channels);
                true
            }
            None => false,
        }
    }

    pub(crate) fn starts(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn is_capturing(&self) -> bool {
        self.shared.callback.lock().is_some()
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.shared.unavailable.store(!available, Ordering::SeqCst);
    }

    pub(crate) fn fail_next_start(&self) {
        self.shared.fail_start.store(true, Ordering::SeqCst);
    }
}

impl CaptureProvider for ScriptedProvider {
    fn is_available(&self) -> bool {
        !self.shared.unavailable.load(Ordering::SeqCst)
    }

    fn start(&mut self, callback: AudioBufferCallback) -> Result<(), CaptureError> {
        if self.shared.fail_start.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::DeviceUnavailable("microphone busy".into()));
        }
        *self.shared.callback.lock() = Some(callback);
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        *self.shared.callback.lock() = None;
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn device_info(&self) -> InputDevice {
        InputDevice {
            id: "scripted".into(),
            name: "Scripted Microphone".into(),
            is_default: true,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Event {
    State(&'static str, StateMetadata),
    Duration(u64),
    Error(CaptureError),
    Segment(u64, f64),
    Finished(FileDescriptor),
}

/// Delegate that records every event in order.
#[derive(Default)]
pub(crate) struct RecordingDelegate {
    events: Mutex<Vec<Event>>,
}

impl RecordingDelegate {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub(crate) fn states(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::State(name, _) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<CaptureError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn segments(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Segment(index, _) => Some(index),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn durations(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Duration(seconds) => Some(seconds),
                _ => None,
            })
            .collect()
    }
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &CaptureState, metadata: &StateMetadata) {
        self.events
            .lock()
            .push(Event::State(state.name(), metadata.clone()));
    }

    fn on_duration_changed(&self, seconds: u64) {
        self.events.lock().push(Event::Duration(seconds));
    }

    fn on_error(&self, error: &CaptureError) {
        self.events.lock().push(Event::Error(error.clone()));
    }

    fn on_segment_completed(&self, index: u64, duration_secs: f64) {
        self.events.lock().push(Event::Segment(index, duration_secs));
    }

    fn on_capture_finished(&self, file: &FileDescriptor) {
        self.events.lock().push(Event::Finished(file.clone()));
    }
}

/// WAV muxer whose `concatenate` blocks until the gate is opened.
pub(crate) struct GatedMuxer {
    open: Mutex<bool>,
    opened: Condvar,
    entries: AtomicUsize,
}

impl GatedMuxer {
    pub(crate) fn new() -> Self {
        Self {
            open: Mutex::new(false),
            opened: Condvar::new(),
            entries: AtomicUsize::new(0),
        }
    }

    pub(crate) fn open_gate(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Spin until `count` calls have entered `concatenate`.
    pub(crate) fn wait_for_entries(&self, count: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.entries.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "muxer was never entered");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Muxer for GatedMuxer {
    fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError> {
        self.entries.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        drop(open);
        WavMuxer.concatenate(inputs, output, cancel)
    }

    fn trim(
        &self,
        input: &Path,
        output: &Path,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError> {
        WavMuxer.trim(input, output, range, cancel)
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, CaptureError> {
        WavMuxer.probe(path)
    }
}

/// WAV muxer that builds the first `successes` compaction candidates and
/// fails every one after that. Finalization concatenates pass through.
pub(crate) struct FailingCompactionMuxer {
    successes: AtomicUsize,
}

impl FailingCompactionMuxer {
    pub(crate) fn after(successes: usize) -> Self {
        Self {
            successes: AtomicUsize::new(successes),
        }
    }
}

impl Muxer for FailingCompactionMuxer {
    fn concatenate(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError> {
        let is_candidate = output
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix("candidate_"))
            .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));
        if is_candidate && !take_one(&self.successes) {
            return Err(CaptureError::CompactionFailed(
                "injected concatenate failure".into(),
            ));
        }
        WavMuxer.concatenate(inputs, output, cancel)
    }

    fn trim(
        &self,
        input: &Path,
        output: &Path,
        range: TimeRange,
        cancel: &CancelToken,
    ) -> Result<MediaInfo, CaptureError> {
        WavMuxer.trim(input, output, range, cancel)
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, CaptureError> {
        WavMuxer.probe(path)
    }
}

/// WAV encoder that fails a set number of opens or writes.
#[derive(Default)]
pub(crate) struct FailingEncoder {
    open_failures: AtomicUsize,
    write_failures: Arc<AtomicUsize>,
}

impl FailingEncoder {
    pub(crate) fn failing_opens(count: usize) -> Self {
        Self {
            open_failures: AtomicUsize::new(count),
            ..Default::default()
        }
    }

    pub(crate) fn failing_writes(count: usize) -> Self {
        Self {
            write_failures: Arc::new(AtomicUsize::new(count)),
            ..Default::default()
        }
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl SegmentEncoder for FailingEncoder {
    fn open(
        &self,
        path: &Path,
        format: &AudioFormat,
    ) -> Result<Box<dyn SegmentWriter>, CaptureError> {
        if take_one(&self.open_failures) {
            return Err(CaptureError::StorageError("injected open failure".into()));
        }
        Ok(Box::new(FlakyWriter {
            inner: WavEncoder.open(path, format)?,
            failures: Arc::clone(&self.write_failures),
        }))
    }

    fn file_extension(&self) -> &str {
        "wav"
    }

    fn mime_type(&self) -> &str {
        "audio/wav"
    }
}

struct FlakyWriter {
    inner: Box<dyn SegmentWriter>,
    failures: Arc<AtomicUsize>,
}

impl SegmentWriter for FlakyWriter {
    fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        if take_one(&self.failures) {
            return Err(CaptureError::StorageError("injected write failure".into()));
        }
        self.inner.write(samples)
    }

    fn frames_written(&self) -> u64 {
        self.inner.frames_written()
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn finish(self: Box<Self>) -> Result<EncodedFile, CaptureError> {
        self.inner.finish()
    }

    fn abandon(self: Box<Self>) {
        self.inner.abandon()
    }
}

/// Every sample of a 16-bit WAV file.
pub(crate) fn read_wav_samples(path: &Path) -> Vec<i16> {
    let mut file = File::open(path).unwrap();
    let layout = wav_format::read_layout(&mut file).unwrap();
    let mut data = vec![0u8; layout.data_len as usize];
    file.seek(SeekFrom::Start(layout.data_offset)).unwrap();
    file.read_exact(&mut data).unwrap();
    data.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Number of entries under `dir`, recursively. Zero if it does not exist.
pub(crate) fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                1 + count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
