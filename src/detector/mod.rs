//! # Baseline and Breakpoint Detection
//!
//! Detection works on [`SessionRecord`]s, one per completed VU iteration, and
//! moves through three states:
//!
//! ```text
//! NoBaseline ──try_capture──▶ BaselineSet ──ratio > threshold──▶ BreakpointLatched
//! ```
//!
//! The only cross-VU writable state of a run lives in [`DetectionState`]:
//! the [`Baseline`] and the [`BreakpointRecord`]. Both are write-once. The
//! state is a single mutex-guarded struct that exposes
//! [`DetectionState::try_capture_baseline`] and
//! [`DetectionState::try_latch_breakpoint`] and never hands out its fields
//! mutably, so the first writer wins no matter how many VUs race.
//!
//! [`BaselineTracker`] decides *whether* a session qualifies as the baseline
//! (its load level must be at or under the configured ceiling), and
//! [`BreakpointDetector`] computes degradation ratios against it.

mod baseline;
mod breakpoint;

pub use baseline::BaselineTracker;
pub use breakpoint::{degradation, BreakpointDetector, Evaluation};

use crate::load::{LoadLevel, Phase};
use parking_lot::Mutex;
use serde::Serialize;

/// Timings of one VU iteration's session lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub vu_id: usize,
    pub iteration: u64,
    pub load_level: LoadLevel,
    pub phase: Phase,
    pub auth_duration_ms: f64,
    pub session_duration_ms: f64,
    pub logout_success: bool,
}

/// Reference performance captured at low concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub session_duration_ms: f64,
    pub auth_duration_ms: f64,
    pub load_level: LoadLevel,
}

impl Baseline {
    pub fn from_session(record: &SessionRecord) -> Self {
        Self {
            session_duration_ms: record.session_duration_ms,
            auth_duration_ms: record.auth_duration_ms,
            load_level: record.load_level,
        }
    }
}

/// The point at which session or auth latency first exceeded the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct BreakpointRecord {
    pub detected: bool,
    pub load_level: Option<LoadLevel>,
    pub session_degradation_ratio: f64,
    pub auth_degradation_ratio: f64,
}

/// Where detection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorPhase {
    NoBaseline,
    BaselineSet,
    BreakpointLatched,
}

#[derive(Debug, Default)]
struct Inner {
    baseline: Option<Baseline>,
    breakpoint: BreakpointRecord,
}

/// Process-wide, write-once detection state shared by all VUs.
#[derive(Debug, Default)]
pub struct DetectionState {
    inner: Mutex<Inner>,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the baseline if none is set yet. Returns `true` for the single winning caller.
    pub fn try_capture_baseline(&self, candidate: Baseline) -> bool {
        let mut inner = self.inner.lock();
        if inner.baseline.is_some() {
            return false;
        }
        inner.baseline = Some(candidate);
        true
    }

    /// Latch the breakpoint if it has not been latched yet.
    ///
    /// Returns `true` for the single winning caller. The stored record always
    /// has `detected == true` once latched.
    pub fn try_latch_breakpoint(
        &self,
        load_level: LoadLevel,
        session_degradation_ratio: f64,
        auth_degradation_ratio: f64,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.breakpoint.detected {
            return false;
        }
        inner.breakpoint = BreakpointRecord {
            detected: true,
            load_level: Some(load_level),
            session_degradation_ratio,
            auth_degradation_ratio,
        };
        true
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.inner.lock().baseline
    }

    pub fn breakpoint(&self) -> BreakpointRecord {
        self.inner.lock().breakpoint
    }

    pub fn phase(&self) -> DetectorPhase {
        let inner = self.inner.lock();
        if inner.breakpoint.detected {
            DetectorPhase::BreakpointLatched
        } else if inner.baseline.is_some() {
            DetectorPhase::BaselineSet
        } else {
            DetectorPhase::NoBaseline
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(ms: f64) -> Baseline {
        Baseline {
            session_duration_ms: ms,
            auth_duration_ms: ms,
            load_level: LoadLevel(10),
        }
    }

    #[test]
    fn test_baseline_written_once() {
        let state = DetectionState::new();
        assert_eq!(state.phase(), DetectorPhase::NoBaseline);
        assert!(state.try_capture_baseline(baseline(100.0)));
        assert!(!state.try_capture_baseline(baseline(5.0)));
        assert_eq!(state.baseline().unwrap().session_duration_ms, 100.0);
        assert_eq!(state.phase(), DetectorPhase::BaselineSet);
    }

    #[test]
    fn test_breakpoint_latched_once() {
        let state = DetectionState::new();
        assert!(!state.breakpoint().detected);
        assert!(state.try_latch_breakpoint(LoadLevel(200), 3.5, 1.0));
        assert!(!state.try_latch_breakpoint(LoadLevel(500), 9.0, 9.0));

        let bp = state.breakpoint();
        assert!(bp.detected);
        assert_eq!(bp.load_level, Some(LoadLevel(200)));
        assert_eq!(bp.session_degradation_ratio, 3.5);
        assert_eq!(state.phase(), DetectorPhase::BreakpointLatched);
    }
}
