use super::{Baseline, DetectionState, SessionRecord};
use crate::load::LoadLevel;
use std::sync::Arc;
use tracing::info;

/// Captures the run's single [`Baseline`] from the low-load window.
#[derive(Debug, Clone)]
pub struct BaselineTracker {
    state: Arc<DetectionState>,
    ceiling: LoadLevel,
}

impl BaselineTracker {
    pub fn new(state: Arc<DetectionState>, ceiling: LoadLevel) -> Self {
        Self { state, ceiling }
    }

    /// Capture `record` as the baseline if none exists and it ran at or under the ceiling.
    ///
    /// Safe to call from any number of VUs at once; exactly one qualifying
    /// caller gets `true`.
    pub fn try_capture(&self, record: &SessionRecord) -> bool {
        if record.load_level > self.ceiling {
            return false;
        }
        let candidate = Baseline::from_session(record);
        let captured = self.state.try_capture_baseline(candidate);
        if captured {
            info!(
                vu_id = record.vu_id,
                load_level = record.load_level.get(),
                session_ms = candidate.session_duration_ms,
                auth_ms = candidate.auth_duration_ms,
                "Performance baseline captured"
            );
        }
        captured
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.state.baseline()
    }

    pub fn ceiling(&self) -> LoadLevel {
        self.ceiling
    }

    pub(crate) fn state(&self) -> &Arc<DetectionState> {
        &self.state
    }
}
