//! Background compaction.
//!
//! After every ledger append the session hands the engine a snapshot of the
//! segments covering the window. A worker thread concatenates them into a
//! versioned candidate file and publishes it, deleting the previous one.
//!
//! At most one merge runs at a time. Triggers that arrive during a run
//! coalesce into a single pending request (newest wins). When a run finishes
//! with a request pending, its result is superseded: the file is discarded
//! and the pending request runs immediately. A run is never aborted.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::segment::Segment;
use crate::models::error::CaptureError;
use crate::storage::scratch::{self, ScratchSpace};
use crate::traits::muxer::{CancelToken, Muxer};

/// A published merge of the ledger window. Immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub path: PathBuf,
    pub duration: Duration,
    pub first_index: u64,
    pub last_index: u64,
    /// Ledger version the snapshot was taken at.
    pub ledger_version: u64,
    pub version: u64,
}

#[derive(Debug, Clone)]
pub struct CompactionRequest {
    pub segments: Vec<Segment>,
    pub ledger_version: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub runs: u64,
    pub publishes: u64,
    pub failures: u64,
}

#[derive(Default)]
struct CompactionShared {
    published: Option<Candidate>,
    running: bool,
    pending: Option<CompactionRequest>,
    /// Bumped to invalidate every run in flight.
    epoch: u64,
    next_version: u64,
    stats: CompactionStats,
}

struct Inner {
    state: Mutex<CompactionShared>,
    idle: Condvar,
    muxer: Arc<dyn Muxer>,
    scratch: Arc<ScratchSpace>,
}

pub struct CompactionEngine {
    inner: Arc<Inner>,
}

impl CompactionEngine {
    pub fn new(muxer: Arc<dyn Muxer>, scratch: Arc<ScratchSpace>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CompactionShared::default()),
                idle: Condvar::new(),
                muxer,
                scratch,
            }),
        }
    }

    /// Request a merge of `request.segments`. Returns immediately.
    pub fn trigger(&self, request: CompactionRequest) {
        if request.segments.is_empty() {
            return;
        }

        let epoch = {
            let mut state = self.inner.state.lock();
            if state.running {
                if state.pending.replace(request).is_some() {
                    log::debug!("compaction trigger coalesced");
                }
                return;
            }
            state.running = true;
            state.epoch
        };

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("compaction".into())
            .spawn(move || run(inner, request, epoch));

        if let Err(e) = spawned {
            log::warn!("failed to spawn compaction worker: {}", e);
            let mut state = self.inner.state.lock();
            state.running = false;
            state.stats.failures += 1;
            self.inner.idle.notify_all();
        }
    }

    /// Drop a trigger that has not started yet. An in-flight run continues.
    pub fn cancel_pending(&self) -> bool {
        self.inner.state.lock().pending.take().is_some()
    }

    /// Hand the latest candidate to the caller, who now owns its file.
    /// Runs still in flight can no longer publish.
    pub fn take_published(&self) -> Option<Candidate> {
        let mut state = self.inner.state.lock();
        state.epoch += 1;
        state.published.take()
    }

    pub fn published(&self) -> Option<Candidate> {
        self.inner.state.lock().published.clone()
    }

    /// Forget everything: cancel the pending trigger, invalidate in-flight
    /// runs and delete the published candidate.
    pub fn discard(&self) {
        let published = {
            let mut state = self.inner.state.lock();
            state.pending = None;
            state.epoch += 1;
            state.published.take()
        };
        if let Some(candidate) = published {
            scratch::remove_quietly(&candidate.path);
        }
    }

    /// Block until no run is in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.running {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.running;
            }
        }
        true
    }

    pub fn stats(&self) -> CompactionStats {
        self.inner.state.lock().stats
    }
}

fn run(inner: Arc<Inner>, mut request: CompactionRequest, mut epoch: u64) {
    loop {
        let version = {
            let mut state = inner.state.lock();
            state.next_version += 1;
            state.stats.runs += 1;
            state.next_version
        };

        let output = inner.scratch.candidate_path(version);
        let inputs: Vec<PathBuf> = request.segments.iter().map(|s| s.path.clone()).collect();
        let result = inner
            .muxer
            .concatenate(&inputs, &output, &CancelToken::new());

        let mut state = inner.state.lock();
        let replaced = match result {
            Ok(_) if state.epoch != epoch => {
                log::debug!("compaction v{} belongs to a discarded window", version);
                scratch::remove_quietly(&output);
                None
            }
            Ok(_) if state.pending.is_some() => {
                log::debug!("compaction v{} superseded before publish", version);
                scratch::remove_quietly(&output);
                None
            }
            Ok(info) => {
                let candidate = Candidate {
                    path: output,
                    duration: info.duration,
                    first_index: request.segments.first().map(|s| s.index).unwrap_or(0),
                    last_index: request.segments.last().map(|s| s.index).unwrap_or(0),
                    ledger_version: request.ledger_version,
                    version,
                };
                log::debug!(
                    "published candidate v{} ({:?}, segments {}..={})",
                    version,
                    candidate.duration,
                    candidate.first_index,
                    candidate.last_index
                );
                state.stats.publishes += 1;
                state.published.replace(candidate)
            }
            Err(e) => {
                let err = CaptureError::CompactionFailed(e.to_string());
                log::warn!("{}", err);
                state.stats.failures += 1;
                None
            }
        };

        let next = state.pending.take();
        if next.is_none() {
            state.running = false;
            inner.idle.notify_all();
        } else {
            epoch = state.epoch;
        }
        drop(state);

        if let Some(previous) = replaced {
            scratch::remove_quietly(&previous.path);
        }

        match next {
            Some(next) => request = next,
            None => break,
        }
    }
}
