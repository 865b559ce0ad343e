//! Segment boundaries.
//!
//! The controller owns the one live segment writer. A rotation hands the
//! writer to a FIFO finisher thread and opens the next one immediately, so
//! the capture path never waits on an encoder flush. Finished segments come
//! back in sequence order through [`RotationController::try_collect`] and
//! [`RotationController::settle`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::segment::Segment;
use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;
use crate::storage::scratch::{self, ScratchSpace};
use crate::traits::encoder::{SegmentEncoder, SegmentWriter};

/// Called on the finisher thread after each result is queued.
pub type FinishNotify = Arc<dyn Fn() + Send + Sync>;

/// What became of a writer handed to the finisher.
#[derive(Debug)]
pub enum FinishOutcome {
    Sealed(Segment),
    /// Closed with no frames; the file was deleted.
    Empty,
    Failed(CaptureError),
}

#[derive(Debug)]
pub struct FinishedSegment {
    pub generation: u64,
    pub index: u64,
    pub outcome: FinishOutcome,
}

struct ActiveSegment {
    index: u64,
    started_at: DateTime<Utc>,
    writer: Box<dyn SegmentWriter>,
}

struct FinishJob {
    generation: u64,
    segment: ActiveSegment,
}

pub struct RotationController {
    encoder: Arc<dyn SegmentEncoder>,
    format: AudioFormat,
    next_index: u64,
    generation: u64,
    current: Option<ActiveSegment>,
    jobs: Option<Sender<FinishJob>>,
    results: Receiver<FinishedSegment>,
    in_flight: usize,
    worker: Option<JoinHandle<()>>,
}

impl RotationController {
    pub fn new(
        encoder: Arc<dyn SegmentEncoder>,
        format: AudioFormat,
        notify: Option<FinishNotify>,
    ) -> Result<Self, CaptureError> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<FinishJob>();
        let (results_tx, results_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("segment-finisher".into())
            .spawn(move || {
                for job in jobs_rx {
                    let finished = finish_job(job);
                    if results_tx.send(finished).is_err() {
                        break;
                    }
                    if let Some(notify) = &notify {
                        notify();
                    }
                }
            })
            .map_err(|e| CaptureError::thread_spawn("segment finisher", e))?;

        Ok(Self {
            encoder,
            format,
            next_index: 0,
            generation: 0,
            current: None,
            jobs: Some(jobs_tx),
            results: results_rx,
            in_flight: 0,
            worker: Some(worker),
        })
    }

    /// Open a writer under a fresh index. The index is consumed even when
    /// opening fails, so a retry never reuses a path.
    pub fn open_next(&mut self, scratch: &ScratchSpace) -> Result<u64, CaptureError> {
        if let Some(active) = self.current.take() {
            log::warn!("replacing open segment {}", active.index);
            active.writer.abandon();
        }

        let index = self.next_index;
        self.next_index += 1;

        let path = scratch.segment_path(index);
        let writer = self
            .encoder
            .open(&path, &self.format)
            .map_err(|e| CaptureError::SegmentWriteFailed(format!("segment {}: {}", index, e)))?;

        self.current = Some(ActiveSegment {
            index,
            started_at: Utc::now(),
            writer,
        });
        log::debug!("opened segment {}", index);
        Ok(index)
    }

    pub fn has_writer(&self) -> bool {
        self.current.is_some()
    }

    /// Write into the live segment. On failure the segment is abandoned and
    /// the caller is expected to open the next one.
    pub fn write(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        let Some(active) = self.current.as_mut() else {
            return Err(CaptureError::SegmentWriteFailed("no open segment".into()));
        };
        if let Err(e) = active.writer.write(samples) {
            let index = active.index;
            self.abandon_current();
            return Err(CaptureError::SegmentWriteFailed(format!(
                "segment {}: {}",
                index, e
            )));
        }
        Ok(())
    }

    /// Seal the live segment in the background and open the next one.
    pub fn rotate(&mut self, scratch: &ScratchSpace) -> Result<u64, CaptureError> {
        self.finish_current();
        self.open_next(scratch)
    }

    /// Hand the live segment to the finisher without opening another.
    pub fn finish_current(&mut self) -> bool {
        let Some(active) = self.current.take() else {
            return false;
        };
        let index = active.index;
        let job = FinishJob {
            generation: self.generation,
            segment: active,
        };

        let Some(jobs) = &self.jobs else {
            job.segment.writer.abandon();
            return false;
        };
        match jobs.send(job) {
            Ok(()) => {
                self.in_flight += 1;
                log::debug!("segment {} submitted for finishing", index);
                true
            }
            Err(mpsc::SendError(job)) => {
                log::warn!("segment finisher is gone; dropping segment {}", index);
                job.segment.writer.abandon();
                false
            }
        }
    }

    /// Close the live segment without sealing it and delete its file.
    pub fn abandon_current(&mut self) -> bool {
        match self.current.take() {
            Some(active) => {
                log::debug!("abandoned segment {}", active.index);
                active.writer.abandon();
                true
            }
            None => false,
        }
    }

    /// Abandon the live segment and start a new generation. Segments still in
    /// the finisher belong to the old generation and are deleted on arrival.
    pub fn new_generation(&mut self) -> u64 {
        self.abandon_current();
        self.generation += 1;
        self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Finished segments of the current generation, without blocking.
    pub fn try_collect(&mut self) -> Vec<FinishedSegment> {
        let mut collected = Vec::new();
        while let Ok(finished) = self.results.try_recv() {
            self.accept(finished, &mut collected);
        }
        collected
    }

    /// Wait until everything submitted has been finished, or `timeout` passes.
    pub fn settle(&mut self, timeout: Duration) -> Vec<FinishedSegment> {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        while self.in_flight > 0 {
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(wait) {
                Ok(finished) => self.accept(finished, &mut collected),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("{} segment(s) still finishing after {:?}", self.in_flight, timeout);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.in_flight = 0;
                    break;
                }
            }
        }
        collected
    }

    /// Abandon the live segment and stop the finisher thread after it drains.
    pub fn shutdown(&mut self) {
        self.abandon_current();
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("segment finisher panicked");
            }
        }
        for finished in self.try_collect() {
            if let FinishOutcome::Sealed(segment) = finished.outcome {
                segment.delete_file();
            }
        }
    }

    fn accept(&mut self, finished: FinishedSegment, into: &mut Vec<FinishedSegment>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if finished.generation != self.generation {
            if let FinishOutcome::Sealed(segment) = &finished.outcome {
                log::debug!("dropping segment {} from a previous generation", segment.index);
                segment.delete_file();
            }
            return;
        }
        into.push(finished);
    }
}

fn finish_job(job: FinishJob) -> FinishedSegment {
    let FinishJob {
        generation,
        segment: ActiveSegment {
            index,
            started_at,
            writer,
        },
    } = job;

    let outcome = match writer.finish() {
        Ok(file) if file.frames == 0 => {
            scratch::remove_quietly(&file.path);
            FinishOutcome::Empty
        }
        Ok(file) => FinishOutcome::Sealed(Segment::from_encoded(index, started_at, file)),
        Err(e) => FinishOutcome::Failed(CaptureError::SegmentWriteFailed(format!(
            "segment {}: {}",
            index, e
        ))),
    };

    FinishedSegment {
        generation,
        index,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::wav_codec::WavEncoder;
    use crate::test_support::FailingEncoder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SETTLE: Duration = Duration::from_secs(5);

    fn format() -> AudioFormat {
        AudioFormat {
            sample_rate: 1_000,
            channels: 1,
            bitrate: 16_000,
        }
    }

    fn controller(notify: Option<FinishNotify>) -> RotationController {
        RotationController::new(Arc::new(WavEncoder), format(), notify).unwrap()
    }

    fn sealed(finished: Vec<FinishedSegment>) -> Vec<Segment> {
        finished
            .into_iter()
            .filter_map(|f| match f.outcome {
                FinishOutcome::Sealed(segment) => Some(segment),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rotations_finish_in_order() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        let mut rotation = controller(None);

        rotation.open_next(&scratch).unwrap();
        for second in 0..4 {
            rotation.write(&[second as i16; 1_000]).unwrap();
            rotation.rotate(&scratch).unwrap();
        }

        let segments = sealed(rotation.settle(SETTLE));
        let indices: Vec<u64> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(segments.iter().all(|s| s.duration == Duration::from_secs(1)));
        assert!(segments.iter().all(|s| s.path.exists()));
        assert!(rotation.has_writer());
        assert_eq!(rotation.in_flight(), 0);
    }

    #[test]
    fn empty_segments_are_discarded() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        let mut rotation = controller(None);

        rotation.open_next(&scratch).unwrap();
        rotation.finish_current();

        let finished = rotation.settle(SETTLE);
        assert_eq!(finished.len(), 1);
        assert!(matches!(finished[0].outcome, FinishOutcome::Empty));
    }

    #[test]
    fn stale_generation_results_are_deleted() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        let mut rotation = controller(None);

        rotation.open_next(&scratch).unwrap();
        rotation.write(&[1; 500]).unwrap();
        let path = rotation.current.as_ref().unwrap().writer.path().to_path_buf();
        rotation.finish_current();
        rotation.new_generation();

        assert!(rotation.settle(SETTLE).is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn abandon_deletes_partial_segment() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        let mut rotation = controller(None);

        rotation.open_next(&scratch).unwrap();
        rotation.write(&[1; 10]).unwrap();
        let path = rotation.current.as_ref().unwrap().writer.path().to_path_buf();

        assert!(rotation.abandon_current());
        assert!(!rotation.has_writer());
        assert!(!path.exists());
        assert!(!rotation.abandon_current());
    }

    #[test]
    fn open_failure_consumes_the_index() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        let encoder = Arc::new(FailingEncoder::failing_opens(1));
        let mut rotation = RotationController::new(encoder, format(), None).unwrap();

        let err = rotation.open_next(&scratch).unwrap_err();
        assert!(matches!(err, CaptureError::SegmentWriteFailed(_)));
        assert_eq!(rotation.open_next(&scratch).unwrap(), 1);
    }

    #[test]
    fn notify_fires_per_result() {
        let dir = TempDir::new().unwrap();
        let scratch = ScratchSpace::create(dir.path(), "wav").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut rotation = controller(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        rotation.open_next(&scratch).unwrap();
        rotation.write(&[0; 10]).unwrap();
        rotation.rotate(&scratch).unwrap();
        rotation.write(&[0; 10]).unwrap();
        rotation.finish_current();
        rotation.settle(SETTLE);
        rotation.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn write_without_writer_fails() {
        let mut rotation = controller(None);
        assert!(matches!(
            rotation.write(&[0; 4]),
            Err(CaptureError::SegmentWriteFailed(_))
        ));
    }
}
