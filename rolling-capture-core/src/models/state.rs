use serde::Serialize;

/// Rolling capture state machine.
///
/// State transitions:
/// ```text
/// idle → recording ⇄ paused
///            ↓         ↓
///           stopping → idle
/// ```
/// `reset()` moves recording/paused → paused without passing through idle.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    Recording { duration_secs: f64 },
    Paused { duration_secs: f64 },
    Stopping,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    /// Whether a session exists that can be paused, resumed, reset or stopped.
    pub fn is_active(&self) -> bool {
        self.is_recording() || self.is_paused()
    }

    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Recording { duration_secs } | Self::Paused { duration_secs } => {
                Some(*duration_secs)
            }
            _ => None,
        }
    }

    /// The caller-facing status. `Stopping` is only visible inside a `stop()`
    /// call, at which point the session is already being torn down.
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Recording { .. } => SessionStatus::Recording,
            Self::Paused { .. } => SessionStatus::Paused,
            Self::Idle | Self::Stopping => SessionStatus::Idle,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording { .. } => "recording",
            Self::Paused { .. } => "paused",
            Self::Stopping => "stopping",
        }
    }
}

/// Result of `getStatus()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Recording,
    Paused,
}

/// Extra context delivered with every `stateChanged` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    /// Recorded duration, excluding paused time.
    pub duration_secs: f64,
    /// Segments currently held by the ledger.
    pub retained_segments: usize,
    /// Audio currently held by the ledger.
    pub retained_secs: f64,
    /// Set when the transition was caused by an audio interruption.
    pub interrupted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopping_reports_idle_status() {
        assert_eq!(CaptureState::Stopping.status(), SessionStatus::Idle);
        assert_eq!(
            CaptureState::Paused { duration_secs: 1.0 }.status(),
            SessionStatus::Paused
        );
    }

    #[test]
    fn duration_only_for_active_states() {
        assert_eq!(CaptureState::Idle.duration(), None);
        assert_eq!(
            CaptureState::Recording { duration_secs: 3.5 }.duration(),
            Some(3.5)
        );
        assert!(!CaptureState::Stopping.is_active());
    }
}
