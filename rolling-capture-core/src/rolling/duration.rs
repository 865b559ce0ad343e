use std::time::Duration;

/// Recorded-time accounting from clock readings.
///
/// Elapsed time is `now - start - paused_total - current_pause`; timer ticks
/// never contribute to it.
#[derive(Debug, Clone, Default)]
pub struct DurationTracker {
    started_at: Option<Duration>,
    paused_total: Duration,
    paused_since: Option<Duration>,
}

impl DurationTracker {
    pub fn start(&mut self, now: Duration) {
        self.started_at = Some(now);
        self.paused_total = Duration::ZERO;
        self.paused_since = None;
    }

    /// Restart from zero in the paused state.
    pub fn restart_paused(&mut self, now: Duration) {
        self.start(now);
        self.paused_since = Some(now);
    }

    pub fn pause(&mut self, now: Duration) {
        if self.started_at.is_some() && self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub fn resume(&mut self, now: Duration) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_sub(since);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        let Some(start) = self.started_at else {
            return Duration::ZERO;
        };
        let current_pause = self
            .paused_since
            .map(|since| now.saturating_sub(since))
            .unwrap_or_default();
        now.saturating_sub(start)
            .saturating_sub(self.paused_total)
            .saturating_sub(current_pause)
    }
}
