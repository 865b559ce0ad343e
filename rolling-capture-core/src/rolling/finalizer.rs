//! Stop-time production of the single output file.
//!
//! Sources are tried cheapest first:
//! 1. the continuous full-session file,
//! 2. the published compaction candidate (plus segments sealed after it),
//! 3. a merge of the ledger tail covering the window.
//!
//! A source that fails is logged and skipped. The chosen source is trimmed to
//! the last `window` of audio: first with a small safety pad in front of the
//! cut, then (with exact trim enabled) cropped to the exact length.

use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::compaction::Candidate;
use super::segment::Segment;
use crate::models::audio_models::{EncodedFile, TimeRange};
use crate::models::config::MAX_TRIM_SAFETY_PAD;
use crate::models::error::CaptureError;
use crate::models::file_descriptor::OutputSource;
use crate::storage::scratch::{self, ScratchSpace};
use crate::traits::muxer::{CancelToken, Muxer};

/// Everything the finalizer may draw on, snapshotted at stop time.
#[derive(Debug, Clone, Default)]
pub struct FinalizeInput {
    pub continuous: Option<EncodedFile>,
    pub candidate: Option<Candidate>,
    /// Ledger segments newer than the candidate's last segment.
    pub candidate_delta: Vec<Segment>,
    /// Ledger segments covering the window.
    pub ledger_tail: Vec<Segment>,
    pub window: Option<Duration>,
    pub exact_trim: bool,
    pub safety_pad: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedAudio {
    pub path: PathBuf,
    pub duration: Duration,
    pub source: OutputSource,
}

pub struct WindowFinalizer {
    muxer: Arc<dyn Muxer>,
    scratch: Arc<ScratchSpace>,
    timeout: Duration,
}

impl WindowFinalizer {
    pub fn new(muxer: Arc<dyn Muxer>, scratch: Arc<ScratchSpace>, timeout: Duration) -> Self {
        Self {
            muxer,
            scratch,
            timeout,
        }
    }

    /// Produce the output on a worker thread. After `timeout` the export is
    /// cancelled and `Timeout` is returned.
    pub fn finalize(&self, input: FinalizeInput) -> Result<FinalizedAudio, CaptureError> {
        let cancel = CancelToken::new();
        let export = Export {
            muxer: Arc::clone(&self.muxer),
            scratch: Arc::clone(&self.scratch),
            cancel: cancel.clone(),
        };

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("finalizer".into())
            .spawn(move || {
                let _ = tx.send(export.run(&input));
            })
            .map_err(|e| {
                CaptureError::FinalizationFailed(format!("failed to spawn finalizer: {}", e))
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                log::error!("finalization exceeded {:?}; cancelled", self.timeout);
                Err(CaptureError::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::FinalizationFailed(
                "finalizer exited without a result".into(),
            )),
        }
    }
}

struct SourceFile {
    path: PathBuf,
    duration: Duration,
    source: OutputSource,
    /// Created by the finalizer itself, so it is deleted once trimmed.
    intermediate: bool,
}

struct Export {
    muxer: Arc<dyn Muxer>,
    scratch: Arc<ScratchSpace>,
    cancel: CancelToken,
}

impl Export {
    fn run(&self, input: &FinalizeInput) -> Result<FinalizedAudio, CaptureError> {
        for source in [
            OutputSource::ContinuousWriter,
            OutputSource::CompactionCandidate,
            OutputSource::TailMerge,
        ] {
            let attempt = self
                .source(source, input)
                .and_then(|file| file.map(|f| self.trim_to_window(f, input)).transpose());

            match attempt {
                Ok(Some(audio)) => {
                    log::info!("finalized {:?} from {:?}", audio.duration, source);
                    return Ok(audio);
                }
                Ok(None) => {}
                Err(CaptureError::Cancelled) => return Err(CaptureError::Cancelled),
                Err(e) => log::warn!("finalization source {:?} failed: {}", source, e),
            }
        }

        Err(CaptureError::FinalizationFailed(
            "no valid recorded audio".into(),
        ))
    }

    /// The untrimmed file for `source`, or None when it is not available.
    fn source(
        &self,
        source: OutputSource,
        input: &FinalizeInput,
    ) -> Result<Option<SourceFile>, CaptureError> {
        match source {
            OutputSource::ContinuousWriter => {
                let Some(file) = input.continuous.as_ref() else {
                    return Ok(None);
                };
                if file.frames == 0 {
                    return Err(CaptureError::FinalizationFailed(
                        "continuous writer recorded nothing".into(),
                    ));
                }
                let info = self.muxer.probe(&file.path)?;
                Ok(Some(SourceFile {
                    path: file.path.clone(),
                    duration: info.duration,
                    source,
                    intermediate: false,
                }))
            }
            OutputSource::CompactionCandidate => {
                let Some(candidate) = input.candidate.as_ref() else {
                    return Ok(None);
                };
                if input.candidate_delta.is_empty() {
                    let info = self.muxer.probe(&candidate.path)?;
                    return Ok(Some(SourceFile {
                        path: candidate.path.clone(),
                        duration: info.duration,
                        source,
                        intermediate: false,
                    }));
                }

                let mut inputs = vec![candidate.path.clone()];
                inputs.extend(input.candidate_delta.iter().map(|s| s.path.clone()));
                self.merge(&inputs, "candidate_delta", source).map(Some)
            }
            OutputSource::TailMerge => {
                let inputs: Vec<PathBuf> =
                    input.ledger_tail.iter().map(|s| s.path.clone()).collect();
                if inputs.is_empty() {
                    return Ok(None);
                }
                self.merge(&inputs, "tail", source).map(Some)
            }
        }
    }

    fn merge(
        &self,
        inputs: &[PathBuf],
        label: &str,
        source: OutputSource,
    ) -> Result<SourceFile, CaptureError> {
        let output = self.scratch.work_path(label);
        let info = self.muxer.concatenate(inputs, &output, &self.cancel)?;
        Ok(SourceFile {
            path: output,
            duration: info.duration,
            source,
            intermediate: true,
        })
    }

    fn trim_to_window(
        &self,
        file: SourceFile,
        input: &FinalizeInput,
    ) -> Result<FinalizedAudio, CaptureError> {
        let window = match input.window {
            Some(window) if file.duration > window => window,
            _ => {
                return Ok(FinalizedAudio {
                    path: file.path,
                    duration: file.duration,
                    source: file.source,
                })
            }
        };

        let pad = input
            .safety_pad
            .min(MAX_TRIM_SAFETY_PAD)
            .min(file.duration - window);
        let range = TimeRange::new(file.duration - window - pad, file.duration);

        let padded = self.scratch.work_path("trim");
        let trimmed = self.muxer.trim(&file.path, &padded, range, &self.cancel);
        if file.intermediate {
            scratch::remove_quietly(&file.path);
        }
        let trimmed = trimmed?;

        if !input.exact_trim || trimmed.duration <= window {
            return Ok(FinalizedAudio {
                path: padded,
                duration: trimmed.duration,
                source: file.source,
            });
        }

        let exact = self.scratch.work_path("exact");
        let cropped = self.muxer.trim(
            &padded,
            &exact,
            TimeRange::tail(trimmed.duration, window),
            &self.cancel,
        );
        scratch::remove_quietly(&padded);
        let cropped = cropped?;

        Ok(FinalizedAudio {
            path: exact,
            duration: cropped.duration,
            source: file.source,
        })
    }
}
