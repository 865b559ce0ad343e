use std::collections::VecDeque;
use std::time::Duration;

use super::segment::Segment;

/// Ordered FIFO of the segments currently retained by a session.
///
/// With a retention window W and segment length S the ledger holds at most
/// `ceil(W / S) + 1` segments, enough to cover W once warm. Without a window
/// it is unbounded unless a hard ceiling is configured. Evicted segments have
/// their files deleted before `append` returns.
#[derive(Debug, Default)]
pub struct SegmentLedger {
    segments: VecDeque<Segment>,
    capacity: Option<usize>,
    version: u64,
}

impl SegmentLedger {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            segments: VecDeque::new(),
            capacity,
            version: 0,
        }
    }

    /// Capacity for a window and segment length; `max_segments` applies only
    /// when there is no window.
    pub fn capacity_for(
        window: Option<Duration>,
        segment: Duration,
        max_segments: Option<usize>,
    ) -> Option<usize> {
        match window {
            Some(window) => {
                let segment = segment.as_nanos().max(1);
                Some(window.as_nanos().div_ceil(segment) as usize + 1)
            }
            None => max_segments,
        }
    }

    /// Push `segment` and evict from the front while over capacity.
    /// Returns the evicted segments, whose files are already deleted.
    pub fn append(&mut self, segment: Segment) -> Vec<Segment> {
        if let Some(last) = self.segments.back() {
            if segment.index <= last.index {
                log::warn!(
                    "segment {} appended after segment {}",
                    segment.index,
                    last.index
                );
            }
        }

        self.segments.push_back(segment);
        self.version += 1;

        let mut evicted = Vec::new();
        if let Some(capacity) = self.capacity {
            while self.segments.len() > capacity {
                if let Some(oldest) = self.segments.pop_front() {
                    oldest.delete_file();
                    log::debug!("evicted segment {}", oldest.index);
                    evicted.push(oldest);
                }
            }
        }
        evicted
    }

    /// Delete every retained segment and set a new capacity.
    pub fn reset(&mut self, capacity: Option<usize>) -> usize {
        let cleared = self.clear();
        self.capacity = capacity;
        cleared
    }

    /// Delete every retained segment. Returns how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.segments.len();
        for segment in self.segments.drain(..) {
            segment.delete_file();
        }
        if count > 0 {
            self.version += 1;
        }
        count
    }

    /// The newest segments whose durations add up to at least `window`,
    /// oldest first. Everything when `window` is None or not yet covered.
    pub fn tail_covering(&self, window: Option<Duration>) -> Vec<Segment> {
        let Some(window) = window else {
            return self.segments.iter().cloned().collect();
        };

        let mut covered = Duration::ZERO;
        let mut start = self.segments.len();
        while start > 0 && covered < window {
            start -= 1;
            covered += self.segments[start].duration;
        }
        self.segments.range(start..).cloned().collect()
    }

    /// Segments appended after the one with `index`, oldest first.
    pub fn segments_after(&self, index: u64) -> Vec<Segment> {
        self.segments
            .iter()
            .filter(|segment| segment.index > index)
            .cloned()
            .collect()
    }

    pub fn contains(&self, index: u64) -> bool {
        self.segments.iter().any(|segment| segment.index == index)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Bumped by every append and non-empty clear.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|segment| segment.duration).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}
