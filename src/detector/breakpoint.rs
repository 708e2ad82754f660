use super::{Baseline, BaselineTracker, BreakpointRecord, DetectorPhase, SessionRecord};
use tracing::{debug, warn};

/// Baseline denominators are floored here so a 0ms baseline cannot divide by zero.
const MIN_BASELINE_MS: f64 = 1.0;

/// Outcome of evaluating one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// No qualifying session has been seen yet.
    AwaitingBaseline,
    /// This session became the baseline.
    BaselineCaptured(Baseline),
    /// Both ratios are at or below the threshold.
    WithinThreshold {
        session_ratio: f64,
        auth_ratio: f64,
    },
    /// This session latched the breakpoint.
    Latched(BreakpointRecord),
    /// The breakpoint was latched earlier; nothing was evaluated.
    AlreadyLatched,
}

/// `(session_ratio, auth_ratio)` of a session against the baseline.
pub fn degradation(baseline: &Baseline, record: &SessionRecord) -> (f64, f64) {
    let session = record.session_duration_ms / baseline.session_duration_ms.max(MIN_BASELINE_MS);
    let auth = record.auth_duration_ms / baseline.auth_duration_ms.max(MIN_BASELINE_MS);
    (session, auth)
}

/// Compares sessions against the baseline and latches the breakpoint once.
#[derive(Debug, Clone)]
pub struct BreakpointDetector {
    tracker: BaselineTracker,
    threshold: f64,
}

impl BreakpointDetector {
    /// Default degradation multiple that marks a breakpoint.
    pub const DEFAULT_THRESHOLD: f64 = 3.0;

    pub fn new(tracker: BaselineTracker, threshold: f64) -> Self {
        Self { tracker, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn tracker(&self) -> &BaselineTracker {
        &self.tracker
    }

    pub fn phase(&self) -> DetectorPhase {
        self.tracker.state().phase()
    }

    pub fn breakpoint(&self) -> BreakpointRecord {
        self.tracker.state().breakpoint()
    }

    /// Feed one completed session through the state machine.
    pub fn evaluate(&self, record: &SessionRecord) -> Evaluation {
        let state = self.tracker.state();
        if state.breakpoint().detected {
            return Evaluation::AlreadyLatched;
        }

        let baseline = match state.baseline() {
            Some(b) => b,
            None => {
                return if self.tracker.try_capture(record) {
                    Evaluation::BaselineCaptured(Baseline::from_session(record))
                } else {
                    Evaluation::AwaitingBaseline
                };
            }
        };

        let (session_ratio, auth_ratio) = degradation(&baseline, record);
        if session_ratio <= self.threshold && auth_ratio <= self.threshold {
            debug!(
                vu_id = record.vu_id,
                load_level = record.load_level.get(),
                session_ratio,
                auth_ratio,
                "Session within degradation threshold"
            );
            return Evaluation::WithinThreshold {
                session_ratio,
                auth_ratio,
            };
        }

        if state.try_latch_breakpoint(record.load_level, session_ratio, auth_ratio) {
            warn!(
                vu_id = record.vu_id,
                load_level = record.load_level.get(),
                phase = %record.phase,
                session_ratio,
                auth_ratio,
                threshold = self.threshold,
                "BREAKPOINT DETECTED: latency degraded beyond threshold"
            );
            Evaluation::Latched(state.breakpoint())
        } else {
            Evaluation::AlreadyLatched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectionState;
    use crate::load::{LoadLevel, Phase};
    use std::sync::Arc;

    fn detector() -> BreakpointDetector {
        let tracker = BaselineTracker::new(Arc::new(DetectionState::new()), LoadLevel(25));
        BreakpointDetector::new(tracker, BreakpointDetector::DEFAULT_THRESHOLD)
    }

    fn session(level: usize, session_ms: f64, auth_ms: f64) -> SessionRecord {
        SessionRecord {
            vu_id: 3,
            iteration: 7,
            load_level: LoadLevel(level),
            phase: Phase::from_level(LoadLevel(level)),
            auth_duration_ms: auth_ms,
            session_duration_ms: session_ms,
            logout_success: true,
        }
    }

    #[test]
    fn test_first_low_load_session_becomes_baseline() {
        let d = detector();
        assert_eq!(d.phase(), DetectorPhase::NoBaseline);
        assert_eq!(d.evaluate(&session(50, 500.0, 200.0)), Evaluation::AwaitingBaseline);
        assert!(matches!(
            d.evaluate(&session(10, 500.0, 200.0)),
            Evaluation::BaselineCaptured(_)
        ));
        assert_eq!(d.phase(), DetectorPhase::BaselineSet);
    }

    #[test]
    fn test_session_degradation_latches() {
        let d = detector();
        d.evaluate(&session(10, 500.0, 200.0));

        match d.evaluate(&session(150, 1600.0, 200.0)) {
            Evaluation::Latched(bp) => {
                assert!(bp.detected);
                assert_eq!(bp.load_level, Some(LoadLevel(150)));
                assert!((bp.session_degradation_ratio - 3.2).abs() < 1e-9);
                assert!((bp.auth_degradation_ratio - 1.0).abs() < 1e-9);
            }
            other => panic!("expected latch, got {other:?}"),
        }
        assert_eq!(d.phase(), DetectorPhase::BreakpointLatched);
    }

    #[test]
    fn test_auth_degradation_alone_latches() {
        let d = detector();
        d.evaluate(&session(10, 500.0, 100.0));
        assert!(matches!(
            d.evaluate(&session(75, 500.0, 301.0)),
            Evaluation::Latched(_)
        ));
    }

    #[test]
    fn test_no_false_latch_below_threshold() {
        let d = detector();
        d.evaluate(&session(10, 500.0, 200.0));

        match d.evaluate(&session(200, 1499.0, 200.0)) {
            Evaluation::WithinThreshold { session_ratio, .. } => {
                assert!((session_ratio - 2.998).abs() < 1e-9);
            }
            other => panic!("expected no latch, got {other:?}"),
        }
        assert!(!d.breakpoint().detected);
    }

    #[test]
    fn test_exactly_threshold_does_not_latch() {
        let d = detector();
        d.evaluate(&session(10, 500.0, 200.0));
        assert!(matches!(
            d.evaluate(&session(100, 1500.0, 600.0)),
            Evaluation::WithinThreshold { .. }
        ));
    }

    #[test]
    fn test_latch_is_monotonic() {
        let d = detector();
        d.evaluate(&session(10, 500.0, 200.0));
        d.evaluate(&session(150, 1600.0, 200.0));
        let first = d.breakpoint();

        for (level, ms) in [(300, 9000.0), (500, 100.0), (25, 4000.0)] {
            assert_eq!(d.evaluate(&session(level, ms, ms)), Evaluation::AlreadyLatched);
        }
        assert_eq!(d.breakpoint(), first);
    }

    #[test]
    fn test_zero_baseline_does_not_divide_by_zero() {
        let baseline = Baseline {
            session_duration_ms: 0.0,
            auth_duration_ms: 0.0,
            load_level: LoadLevel(10),
        };
        let (s, a) = degradation(&baseline, &session(50, 2.0, 0.5));
        assert_eq!(s, 2.0);
        assert_eq!(a, 0.5);
    }

    #[test]
    fn test_concurrent_latch_single_record() {
        let d = detector();
        d.evaluate(&session(10, 100.0, 100.0));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let d = d.clone();
                std::thread::spawn(move || {
                    matches!(
                        d.evaluate(&session(500, 1000.0 + i as f64, 100.0)),
                        Evaluation::Latched(_)
                    )
                })
            })
            .collect();
        let latched = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|l| *l)
            .count();
        assert_eq!(latched, 1);
        assert_eq!(d.breakpoint().load_level, Some(LoadLevel(500)));
    }
}
