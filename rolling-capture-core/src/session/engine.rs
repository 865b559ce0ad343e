//! The serialized session state machine.
//!
//! Every mutation (commands, rotation ticks, frame pumping, ledger appends)
//! goes through `&mut Engine`, which the recorder keeps behind a single
//! `parking_lot::Mutex`. Background work (segment finishing, compaction,
//! finalization exports) runs on worker threads and reports back through
//! channels or shared state that the engine drains while holding the lock.
//!
//! Data flow while recording:
//! ```text
//! [CaptureProvider] → FrameConverter → CaptureBuffer ─pump→ RotationController ─rotate→ finisher
//!                                                      └──→ continuous writer        │
//!                                            CompactionEngine ←trigger─ SegmentLedger ←┘
//! ```

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioFormat, InputDevice, SessionDiagnostics};
use crate::models::config::RollingConfiguration;
use crate::models::error::CaptureError;
use crate::models::file_descriptor::FileDescriptor;
use crate::models::state::{CaptureState, SessionStatus, StateMetadata};
use crate::processing::capture_buffer::CaptureBuffer;
use crate::processing::format_adapter::FrameConverter;
use crate::rolling::compaction::{CompactionEngine, CompactionRequest};
use crate::rolling::duration::DurationTracker;
use crate::rolling::finalizer::{FinalizeInput, WindowFinalizer};
use crate::rolling::ledger::SegmentLedger;
use crate::rolling::rotation::{FinishNotify, FinishOutcome, FinishedSegment, RotationController};
use crate::storage::scratch::{self, ScratchSpace};
use crate::storage::{metadata, output};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_provider::{AudioBufferCallback, CaptureProvider};
use crate::traits::clock::Clock;
use crate::traits::encoder::{SegmentEncoder, SegmentWriter};
use crate::traits::muxer::Muxer;

/// Audio the capture buffer holds between pumps before dropping the oldest.
const CAPTURE_BUFFER_CAPACITY: Duration = Duration::from_secs(5);

/// How long stop waits for segments already handed to the finisher.
const SEGMENT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long teardown waits for an in-flight compaction before removing scratch.
const COMPACTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Default)]
struct Events(Option<Arc<dyn CaptureDelegate>>);

impl Events {
    fn state(&self, state: &CaptureState, metadata: &StateMetadata) {
        if let Some(delegate) = &self.0 {
            delegate.on_state_changed(state, metadata);
        }
    }

    fn duration(&self, seconds: u64) {
        if let Some(delegate) = &self.0 {
            delegate.on_duration_changed(seconds);
        }
    }

    fn error(&self, error: &CaptureError) {
        if let Some(delegate) = &self.0 {
            delegate.on_error(error);
        }
    }

    fn segment(&self, index: u64, duration_secs: f64) {
        if let Some(delegate) = &self.0 {
            delegate.on_segment_completed(index, duration_secs);
        }
    }

    fn finished(&self, file: &FileDescriptor) {
        if let Some(delegate) = &self.0 {
            delegate.on_capture_finished(file);
        }
    }
}

/// Everything that exists only between `start()` and `stop()`.
struct ActiveSession {
    config: RollingConfiguration,
    format: AudioFormat,
    scratch: Arc<ScratchSpace>,
    buffer: Arc<Mutex<CaptureBuffer>>,
    /// Cleared while paused so the device callback drops frames.
    accepting: Arc<AtomicBool>,
    rotation: RotationController,
    ledger: SegmentLedger,
    compaction: CompactionEngine,
    continuous: Option<Box<dyn SegmentWriter>>,
    duration: DurationTracker,
    /// Rotation ticks carrying another epoch are stale.
    epoch: u64,
    generation: u64,
    writer_failed: bool,
    diagnostics: SessionDiagnostics,
}

impl ActiveSession {
    fn open(
        config: RollingConfiguration,
        encoder: &Arc<dyn SegmentEncoder>,
        muxer: &Arc<dyn Muxer>,
        notify: Option<FinishNotify>,
    ) -> Result<Self, CaptureError> {
        let scratch = Arc::new(ScratchSpace::create(
            &config.scratch_directory,
            encoder.file_extension(),
        )?);

        let assembled = Self::assemble(config, Arc::clone(&scratch), encoder, muxer, notify);
        if assembled.is_err() {
            if let Err(e) = scratch.destroy() {
                log::warn!("failed to clean up scratch after failed start: {}", e);
            }
        }
        assembled
    }

    fn assemble(
        config: RollingConfiguration,
        scratch: Arc<ScratchSpace>,
        encoder: &Arc<dyn SegmentEncoder>,
        muxer: &Arc<dyn Muxer>,
        notify: Option<FinishNotify>,
    ) -> Result<Self, CaptureError> {
        let format = config.format();
        let capacity = SegmentLedger::capacity_for(
            config.retention_window,
            config.segment_duration,
            config.max_segments,
        );

        let mut rotation = RotationController::new(Arc::clone(encoder), format, notify)?;
        rotation.open_next(&scratch)?;

        let continuous = if config.features.continuous_writer {
            Some(open_continuous(encoder, &scratch, 0, &format)?)
        } else {
            None
        };

        Ok(Self {
            format,
            buffer: Arc::new(Mutex::new(CaptureBuffer::new(
                &format,
                CAPTURE_BUFFER_CAPACITY,
            ))),
            accepting: Arc::new(AtomicBool::new(true)),
            rotation,
            ledger: SegmentLedger::new(capacity),
            compaction: CompactionEngine::new(Arc::clone(muxer), Arc::clone(&scratch)),
            continuous,
            duration: DurationTracker::default(),
            epoch: 0,
            generation: 0,
            writer_failed: false,
            diagnostics: SessionDiagnostics::default(),
            scratch,
            config,
        })
    }

    /// The closure handed to the provider. Runs on the device thread and only
    /// converts and queues.
    fn frame_callback(&self) -> AudioBufferCallback {
        let converter = FrameConverter::new(&self.format);
        let buffer = Arc::clone(&self.buffer);
        let accepting = Arc::clone(&self.accepting);

        Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            if !accepting.load(Ordering::Acquire) {
                return;
            }
            let pcm = converter.convert(samples, sample_rate, channels);
            buffer.lock().push(&pcm);
        })
    }

    /// Move queued frames into the live writer(s).
    fn pump(&mut self, events: &Events) {
        let samples = self.buffer.lock().drain();
        if samples.is_empty() {
            return;
        }
        let frames = (samples.len() / self.format.channels.max(1) as usize) as u64;

        if self.ensure_writer(events) {
            match self.rotation.write(&samples) {
                Ok(()) => self.diagnostics.frames_written += frames,
                Err(e) => {
                    self.diagnostics.frames_dropped += frames;
                    self.segment_failure(e, events);
                    self.ensure_writer(events);
                }
            }
        } else {
            self.diagnostics.frames_dropped += frames;
        }

        if let Some(writer) = self.continuous.as_mut() {
            if let Err(e) = writer.write(&samples) {
                let err = CaptureError::SegmentWriteFailed(format!("continuous writer: {}", e));
                log::warn!("{}; continuing without it", err);
                if let Some(writer) = self.continuous.take() {
                    writer.abandon();
                }
                events.error(&err);
            }
        }
    }

    /// Make sure a segment writer is open, retrying under a fresh index.
    fn ensure_writer(&mut self, events: &Events) -> bool {
        if self.rotation.has_writer() {
            return true;
        }
        match self.rotation.open_next(&self.scratch) {
            Ok(_) => {
                self.writer_failed = false;
                true
            }
            Err(e) => {
                self.diagnostics.segment_write_failures += 1;
                log::warn!("{}", e);
                if !self.writer_failed {
                    events.error(&e);
                }
                self.writer_failed = true;
                false
            }
        }
    }

    fn segment_failure(&mut self, error: CaptureError, events: &Events) {
        self.diagnostics.segment_write_failures += 1;
        log::warn!("{}", error);
        events.error(&error);
    }

    fn collect(&mut self, events: &Events) {
        let finished = self.rotation.try_collect();
        self.apply_finished(finished, events, true);
    }

    fn apply_finished(&mut self, finished: Vec<FinishedSegment>, events: &Events, compact: bool) {
        let mut appended = false;
        for result in finished {
            match result.outcome {
                FinishOutcome::Sealed(segment) => {
                    let index = segment.index;
                    let secs = segment.duration.as_secs_f64();
                    let evicted = self.ledger.append(segment);
                    self.diagnostics.segments_completed += 1;
                    self.diagnostics.segments_evicted += evicted.len() as u64;
                    log::debug!(
                        "segment {} appended ({:.2}s, {} retained, {} evicted)",
                        index,
                        secs,
                        self.ledger.len(),
                        evicted.len()
                    );
                    events.segment(index, secs);
                    appended = true;
                }
                FinishOutcome::Empty => {
                    log::debug!("segment {} held no audio; discarded", result.index);
                }
                FinishOutcome::Failed(e) => self.segment_failure(e, events),
            }
        }

        if appended && compact && self.config.features.compaction {
            self.compaction.trigger(CompactionRequest {
                segments: self.ledger.tail_covering(self.config.retention_window),
                ledger_version: self.ledger.version(),
            });
        }
    }

    fn metadata(&self, now: Duration, interrupted: bool) -> StateMetadata {
        StateMetadata {
            duration_secs: self.duration.elapsed(now).as_secs_f64(),
            retained_segments: self.ledger.len(),
            retained_secs: self.ledger.total_duration().as_secs_f64(),
            interrupted,
        }
    }

    fn diagnostics_snapshot(&self) -> SessionDiagnostics {
        let mut diagnostics = self.diagnostics.clone();
        diagnostics.frames_dropped += self.buffer.lock().dropped_frames();
        let stats = self.compaction.stats();
        diagnostics.compaction_runs = stats.runs;
        diagnostics.compaction_publishes = stats.publishes;
        diagnostics.compaction_failures = stats.failures;
        diagnostics
    }

    /// Seal what was recorded and produce the output file.
    fn finalize(
        &mut self,
        was_recording: bool,
        mime_type: &str,
        muxer: &Arc<dyn Muxer>,
        events: &Events,
    ) -> Result<FileDescriptor, CaptureError> {
        if was_recording {
            self.pump(events);
            self.rotation.finish_current();
        } else {
            self.rotation.abandon_current();
        }

        self.compaction.cancel_pending();
        let finished = self.rotation.settle(SEGMENT_SETTLE_TIMEOUT);
        self.apply_finished(finished, events, false);
        let candidate = self.compaction.take_published().and_then(|candidate| {
            if self.ledger.contains(candidate.first_index)
                && self.ledger.contains(candidate.last_index)
            {
                return Some(candidate);
            }
            log::warn!(
                "candidate v{} covers segments {}..={} no longer retained; merging the tail",
                candidate.version,
                candidate.first_index,
                candidate.last_index
            );
            scratch::remove_quietly(&candidate.path);
            None
        });

        let continuous = match self.continuous.take() {
            Some(writer) => match writer.finish() {
                Ok(file) => Some(file),
                Err(e) => {
                    log::warn!("failed to seal continuous writer: {}", e);
                    None
                }
            },
            None => None,
        };

        let window = self.config.retention_window;
        let input = FinalizeInput {
            continuous,
            candidate_delta: candidate
                .as_ref()
                .map(|c| self.ledger.segments_after(c.last_index))
                .unwrap_or_default(),
            candidate,
            ledger_tail: self.ledger.tail_covering(window),
            window,
            exact_trim: self.config.features.exact_trim,
            safety_pad: self.config.trim_safety_pad,
        };

        let finalizer = WindowFinalizer::new(
            Arc::clone(muxer),
            Arc::clone(&self.scratch),
            self.config.finalize_timeout,
        );
        let audio = finalizer.finalize(input)?;

        let size_bytes = fs::metadata(&audio.path)
            .map_err(|e| CaptureError::storage("failed to stat output", e))?
            .len();
        let checksum = output::sha256_file(&audio.path)?;
        let destination =
            output::output_path(&self.config.output_directory, self.scratch.extension());
        output::deliver(&audio.path, &destination)?;

        let descriptor = FileDescriptor::new(
            &destination,
            mime_type,
            size_bytes,
            audio.duration,
            &self.format,
            checksum,
            audio.source,
        );

        if self.config.write_metadata_sidecar {
            if let Err(e) = metadata::write_metadata(&descriptor) {
                log::warn!("failed to write metadata sidecar: {}", e);
            }
        }
        Ok(descriptor)
    }

    /// Release every writer and worker and delete all scratch files.
    fn dispose(&mut self) {
        self.accepting.store(false, Ordering::Release);
        self.rotation.shutdown();
        if let Some(writer) = self.continuous.take() {
            writer.abandon();
        }
        self.ledger.clear();
        self.compaction.discard();
        if !self.compaction.wait_idle(COMPACTION_DRAIN_TIMEOUT) {
            log::warn!("compaction still running at teardown");
        }
        if let Err(e) = self.scratch.destroy() {
            log::warn!("failed to remove scratch: {}", e);
        }
    }
}

fn open_continuous(
    encoder: &Arc<dyn SegmentEncoder>,
    scratch: &ScratchSpace,
    generation: u64,
    format: &AudioFormat,
) -> Result<Box<dyn SegmentWriter>, CaptureError> {
    encoder
        .open(&scratch.session_path(generation), format)
        .map_err(|e| CaptureError::SegmentWriteFailed(format!("continuous writer: {}", e)))
}

fn no_session() -> CaptureError {
    CaptureError::InvalidState("no active session".into())
}

/// Rolling capture state machine. Not thread-safe by itself; see
/// [`RollingRecorder`](super::recorder::RollingRecorder) for the locked,
/// timer-driven wrapper.
pub struct Engine {
    provider: Box<dyn CaptureProvider>,
    encoder: Arc<dyn SegmentEncoder>,
    muxer: Arc<dyn Muxer>,
    clock: Arc<dyn Clock>,
    events: Events,
    finish_notify: Option<FinishNotify>,
    state: CaptureState,
    session: Option<ActiveSession>,
    resume_after_interruption: bool,
    last_diagnostics: SessionDiagnostics,
}

impl Engine {
    pub fn new(
        provider: Box<dyn CaptureProvider>,
        encoder: Arc<dyn SegmentEncoder>,
        muxer: Arc<dyn Muxer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            encoder,
            muxer,
            clock,
            events: Events::default(),
            finish_notify: None,
            state: CaptureState::Idle,
            session: None,
            resume_after_interruption: false,
            last_diagnostics: SessionDiagnostics::default(),
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.events = Events(Some(delegate));
    }

    /// Hook run on the finisher thread whenever a segment is ready.
    pub fn set_finish_notify(&mut self, notify: FinishNotify) {
        self.finish_notify = Some(notify);
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Recorded time, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        match &self.session {
            Some(session) => session.duration.elapsed(self.clock.now()),
            None => Duration::ZERO,
        }
    }

    /// Recorded whole seconds.
    pub fn duration(&self) -> u64 {
        self.elapsed().as_secs()
    }

    /// The epoch rotation ticks must carry, while recording.
    pub fn rotation_epoch(&self) -> Option<u64> {
        match &self.session {
            Some(session) if self.state.is_recording() => Some(session.epoch),
            _ => None,
        }
    }

    pub fn segment_duration(&self) -> Option<Duration> {
        self.session
            .as_ref()
            .map(|session| session.config.segment_duration)
    }

    pub fn retained_segments(&self) -> usize {
        self.session
            .as_ref()
            .map(|session| session.ledger.len())
            .unwrap_or(0)
    }

    pub fn input_device(&self) -> Option<InputDevice> {
        self.provider
            .is_available()
            .then(|| self.provider.device_info())
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        match &self.session {
            Some(session) => session.diagnostics_snapshot(),
            None => self.last_diagnostics.clone(),
        }
    }

    /// idle → recording.
    pub fn start(&mut self, config: RollingConfiguration) -> Result<(), CaptureError> {
        if !self.state.is_idle() {
            return Err(CaptureError::InvalidState(format!(
                "cannot start while {}",
                self.state.name()
            )));
        }

        let config = config.normalized()?;

        if !self.provider.is_available() {
            let device = self.provider.device_info();
            let err = CaptureError::DeviceUnavailable(format!("{} is not available", device.name));
            log::error!("{}", err);
            return Err(err);
        }

        let mut session =
            ActiveSession::open(config, &self.encoder, &self.muxer, self.finish_notify.clone())?;

        if let Err(e) = self.provider.start(session.frame_callback()) {
            session.dispose();
            let err = match e {
                CaptureError::DeviceUnavailable(_) => e,
                other => CaptureError::DeviceUnavailable(other.to_string()),
            };
            log::error!("failed to start capture: {}", err);
            return Err(err);
        }

        session.duration.start(self.clock.now());
        log::info!(
            "rolling capture started: {} Hz x{}, segments {:?}, window {:?}",
            session.format.sample_rate,
            session.format.channels,
            session.config.segment_duration,
            session.config.retention_window
        );

        self.session = Some(session);
        self.resume_after_interruption = false;
        self.set_state(CaptureState::Recording { duration_secs: 0.0 }, false);
        Ok(())
    }

    /// recording → paused. The in-progress segment is abandoned.
    pub fn pause(&mut self) -> Result<(), CaptureError> {
        self.resume_after_interruption = false;
        self.pause_with(false)
    }

    /// paused → recording under a new segment index.
    pub fn resume(&mut self) -> Result<(), CaptureError> {
        self.resume_after_interruption = false;
        self.resume_with(false)
    }

    /// recording/paused → paused with an empty ledger and zero duration.
    /// The capture device stays open throughout.
    pub fn reset(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_active() {
            return Err(CaptureError::InvalidState(format!(
                "cannot reset while {}",
                self.state.name()
            )));
        }
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or_else(no_session)?;

        session.accepting.store(false, Ordering::Release);
        session.buffer.lock().clear();
        session.generation = session.rotation.new_generation();
        if let Some(writer) = session.continuous.take() {
            writer.abandon();
        }
        let cleared = session.ledger.clear();
        session.compaction.discard();
        session.duration.restart_paused(now);
        session.epoch += 1;

        session.ensure_writer(&self.events);
        if session.config.features.continuous_writer {
            match open_continuous(
                &self.encoder,
                &session.scratch,
                session.generation,
                &session.format,
            ) {
                Ok(writer) => session.continuous = Some(writer),
                Err(e) => {
                    log::warn!("{}", e);
                    self.events.error(&e);
                }
            }
        }

        log::info!("rolling capture reset; {} segment(s) discarded", cleared);
        self.resume_after_interruption = false;
        self.set_state(CaptureState::Paused { duration_secs: 0.0 }, false);
        Ok(())
    }

    /// recording/paused → stopping → idle.
    ///
    /// The capture device is released and scratch removed whether or not a
    /// file could be produced.
    pub fn stop(&mut self) -> Result<FileDescriptor, CaptureError> {
        if !self.state.is_active() {
            return Err(CaptureError::InvalidState(format!(
                "cannot stop while {}",
                self.state.name()
            )));
        }
        let was_recording = self.state.is_recording();
        self.set_state(CaptureState::Stopping, false);

        let Some(mut session) = self.session.take() else {
            self.set_state(CaptureState::Idle, false);
            return Err(no_session());
        };

        session.accepting.store(false, Ordering::Release);
        if let Err(e) = self.provider.stop() {
            log::warn!("failed to stop capture provider: {}", e);
        }

        let mime_type = self.encoder.mime_type().to_string();
        let result = session.finalize(was_recording, &mime_type, &self.muxer, &self.events);
        self.last_diagnostics = session.diagnostics_snapshot();
        session.dispose();

        self.resume_after_interruption = false;
        self.set_state(CaptureState::Idle, false);

        match result {
            Ok(descriptor) => {
                log::info!(
                    "rolling capture stopped: {} ({:.1}s, {:?})",
                    descriptor.filename,
                    descriptor.duration_seconds,
                    descriptor.source
                );
                self.events.finished(&descriptor);
                Ok(descriptor)
            }
            Err(e) => {
                let err = match e {
                    CaptureError::Timeout | CaptureError::FinalizationFailed(_) => e,
                    other => CaptureError::FinalizationFailed(other.to_string()),
                };
                log::error!("rolling capture stop failed: {}", err);
                self.events.error(&err);
                Err(err)
            }
        }
    }

    /// An audio interruption began. Pauses only if recording, remembering
    /// that it did.
    pub fn begin_interruption(&mut self) -> Result<(), CaptureError> {
        self.resume_after_interruption = self.state.is_recording();
        if self.resume_after_interruption {
            log::info!("audio interruption began; pausing");
            self.pause_with(true)
        } else {
            Ok(())
        }
    }

    /// An audio interruption ended. Resumes only if the interruption paused us.
    pub fn end_interruption(&mut self) -> Result<(), CaptureError> {
        if !std::mem::take(&mut self.resume_after_interruption) || !self.state.is_paused() {
            return Ok(());
        }
        log::info!("audio interruption ended; resuming");
        self.resume_with(true)
    }

    /// Rotation timer event. Ignored unless recording under `epoch`.
    pub fn on_rotation_tick(&mut self, epoch: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !self.state.is_recording() || epoch != session.epoch {
            log::debug!("ignoring stale rotation tick (epoch {})", epoch);
            return;
        }

        session.pump(&self.events);
        match session.rotation.rotate(&session.scratch) {
            Ok(index) => {
                session.writer_failed = false;
                log::debug!("rotated; segment {} open", index);
            }
            Err(e) => {
                session.writer_failed = true;
                session.segment_failure(e, &self.events);
            }
        }
        session.collect(&self.events);
    }

    /// Processing timer event: drain captured frames into the writers.
    pub fn pump(&mut self) {
        if !self.state.is_recording() {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.pump(&self.events);
            session.collect(&self.events);
        }
    }

    /// Append any segments the finisher has sealed since the last call.
    pub fn collect_finished(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.collect(&self.events);
        }
    }

    /// Duration timer event.
    pub fn emit_duration(&mut self) {
        if !self.state.is_recording() {
            return;
        }
        let elapsed = self.elapsed();
        self.state = CaptureState::Recording {
            duration_secs: elapsed.as_secs_f64(),
        };
        self.events.duration(elapsed.as_secs());
    }

    /// Tear down an active session without producing a file.
    pub fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        log::info!("rolling capture torn down while {}", self.state.name());
        session.dispose();
        if let Err(e) = self.provider.stop() {
            log::warn!("failed to stop capture provider: {}", e);
        }
        self.last_diagnostics = session.diagnostics_snapshot();
        self.resume_after_interruption = false;
        self.set_state(CaptureState::Idle, false);
    }

    fn pause_with(&mut self, interrupted: bool) -> Result<(), CaptureError> {
        if !self.state.is_recording() {
            return Err(CaptureError::InvalidState(format!(
                "cannot pause while {}",
                self.state.name()
            )));
        }
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or_else(no_session)?;

        session.pump(&self.events);
        session.accepting.store(false, Ordering::Release);
        session.buffer.lock().clear();
        if session.rotation.abandon_current() {
            session.diagnostics.segments_abandoned += 1;
        }
        session.duration.pause(now);
        session.epoch += 1;
        session.collect(&self.events);

        let secs = session.duration.elapsed(now).as_secs_f64();
        log::info!("rolling capture paused at {:.1}s", secs);
        self.set_state(CaptureState::Paused { duration_secs: secs }, interrupted);
        Ok(())
    }

    fn resume_with(&mut self, interrupted: bool) -> Result<(), CaptureError> {
        if !self.state.is_paused() {
            return Err(CaptureError::InvalidState(format!(
                "cannot resume while {}",
                self.state.name()
            )));
        }
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or_else(no_session)?;

        session.duration.resume(now);
        session.buffer.lock().clear();
        session.ensure_writer(&self.events);
        session.epoch += 1;
        session.accepting.store(true, Ordering::Release);

        let secs = session.duration.elapsed(now).as_secs_f64();
        log::info!("rolling capture resumed at {:.1}s", secs);
        self.set_state(CaptureState::Recording { duration_secs: secs }, interrupted);
        Ok(())
    }

    fn set_state(&mut self, state: CaptureState, interrupted: bool) {
        let metadata = match &self.session {
            Some(session) => session.metadata(self.clock.now(), interrupted),
            None => StateMetadata {
                interrupted,
                ..Default::default()
            },
        };
        log::debug!("state {} → {}", self.state.name(), state.name());
        self.state = state;
        self.events.state(&self.state, &metadata);
    }

    /// Wait for finishing segments and compaction, then collect.
    #[cfg(test)]
    pub(crate) fn settle(&mut self) {
        let wait = Duration::from_secs(5);
        if let Some(session) = self.session.as_mut() {
            let finished = session.rotation.settle(wait);
            session.apply_finished(finished, &self.events, true);
            assert!(session.compaction.wait_idle(wait));
        }
    }

    #[cfg(test)]
    pub(crate) fn scratch_root(&self) -> Option<std::path::PathBuf> {
        self.session
            .as_ref()
            .map(|session| session.scratch.root().to_path_buf())
    }

    #[cfg(test)]
    pub(crate) fn published_candidate(&self) -> Option<crate::rolling::compaction::Candidate> {
        self.session
            .as_ref()
            .and_then(|session| session.compaction.published())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
