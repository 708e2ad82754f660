//! # Virtual Users
//!
//! A virtual user (VU) is one tokio task looping iterations until the
//! scheduler retires its slot:
//!
//! 1. bucket the current active concurrency into a [`LoadLevel`] and phase;
//! 2. authenticate, then verify the session (both timed);
//! 3. run one workload category through the [`ScenarioDispatcher`];
//! 4. log out;
//! 5. hand the [`SessionRecord`] to the [`BreakpointDetector`];
//! 6. think for the phase's think time, or less if retired meanwhile.
//!
//! A failed login abandons the iteration straight away. A failed session
//! check abandons it after a logout attempt, and that session is never
//! evaluated.

use crate::client::{ApiError, CallContext, Session, TargetApi};
use crate::detector::{BreakpointDetector, Evaluation, SessionRecord};
use crate::load::{LoadLevel, LoadLevels, Phase};
use crate::metrics::{MetricsRecorder, OperationSample};
use crate::scenario::{IterationOutcome, ScenarioDispatcher};
use crate::scheduler::{ActiveUsers, VuSlot};
use crate::tolerance::think_time;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

const LOGIN_OPERATION: &str = "auth.login";
const SESSION_OPERATION: &str = "auth.session";
const LOGOUT_OPERATION: &str = "auth.logout";

/// State shared by every VU of a run.
#[derive(Clone)]
pub struct VuShared {
    pub api: Arc<dyn TargetApi>,
    pub dispatcher: ScenarioDispatcher,
    pub detector: BreakpointDetector,
    pub metrics: Arc<MetricsRecorder>,
    pub levels: LoadLevels,
    pub active: ActiveUsers,
    /// Run seed; each VU derives its own stream from it.
    pub seed: Option<u64>,
}

/// How one iteration ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IterationResult {
    AuthFailed(ApiError),
    SessionRejected,
    Completed {
        outcome: IterationOutcome,
        evaluation: Evaluation,
    },
}

/// One finished iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: u64,
    pub load_level: LoadLevel,
    pub phase: Phase,
    pub result: IterationResult,
}

pub struct VirtualUser {
    id: usize,
    shared: Arc<VuShared>,
    slot: VuSlot,
    rng: StdRng,
    iteration: u64,
}

impl VirtualUser {
    pub fn new(shared: Arc<VuShared>, slot: VuSlot) -> Self {
        let rng = match shared.seed {
            Some(seed) => StdRng::seed_from_u64(derive_seed(seed, slot.spawn_index)),
            None => StdRng::from_entropy(),
        };
        Self {
            id: slot.slot,
            shared,
            slot,
            rng,
            iteration: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Loop iterations until the slot is retired.
    pub async fn run(mut self) {
        let _guard = self.shared.active.enter();
        debug!(vu_id = self.id, "Virtual user started");

        while !self.slot.signal.is_retired() {
            let report = self.iterate().await;
            let pause = think_time(report.phase);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = self.slot.signal.retired() => {}
            }
        }

        debug!(vu_id = self.id, iterations = self.iteration, "Virtual user retired");
    }

    /// Run a single iteration.
    pub async fn iterate(&mut self) -> IterationReport {
        self.iteration += 1;
        let shared = self.shared.clone();
        shared.metrics.inc_iterations_started();

        let load_level = shared.levels.level_for(shared.active.get());
        let phase = Phase::for_iteration(load_level, self.slot.signal.trend());
        let ctx = CallContext {
            vu_id: self.id,
            iteration: self.iteration,
            load_level,
        };
        let report = |result| IterationReport {
            iteration: ctx.iteration,
            load_level,
            phase,
            result,
        };

        let started = Instant::now();
        let session = match shared.api.authenticate(&ctx).await {
            Ok(session) => session,
            Err(err) => {
                let status = match err {
                    ApiError::Rejected { status } => Some(status),
                    _ => None,
                };
                self.sample(&ctx, LOGIN_OPERATION, elapsed_ms(started), false, status);
                shared.metrics.inc_auth_failure();
                info!(
                    vu_id = ctx.vu_id,
                    iteration = ctx.iteration,
                    load_level = load_level.get(),
                    error = %err,
                    "Authentication failed, abandoning iteration"
                );
                return report(IterationResult::AuthFailed(err));
            }
        };
        let auth_duration_ms = elapsed_ms(started);
        self.sample(&ctx, LOGIN_OPERATION, auth_duration_ms, true, None);

        let started = Instant::now();
        let verified = shared.api.verify_session(&ctx, &session).await;
        let session_duration_ms = elapsed_ms(started);
        let (verified_ok, status) = match &verified {
            Ok(resp) => (resp.is_success(), Some(resp.status)),
            Err(_) => (false, None),
        };
        self.sample(&ctx, SESSION_OPERATION, session_duration_ms, verified_ok, status);
        if !verified_ok {
            info!(
                vu_id = ctx.vu_id,
                iteration = ctx.iteration,
                status = ?status,
                "Session verification failed, abandoning iteration"
            );
            self.logout(&ctx, &session).await;
            return report(IterationResult::SessionRejected);
        }

        let kind = shared.dispatcher.pick(&mut self.rng);
        let outcome = shared.dispatcher.execute(kind, &ctx, &session).await;

        let logout_success = self.logout(&ctx, &session).await;

        let record = SessionRecord {
            vu_id: ctx.vu_id,
            iteration: ctx.iteration,
            load_level,
            phase,
            auth_duration_ms,
            session_duration_ms,
            logout_success,
        };
        let evaluation = shared.detector.evaluate(&record);
        shared.metrics.inc_iterations_completed();

        info!(
            vu_id = ctx.vu_id,
            iteration = ctx.iteration,
            load_level = load_level.get(),
            phase = %phase,
            scenario = %kind,
            successes = outcome.successes,
            operations = outcome.operations,
            auth_ms = auth_duration_ms,
            session_ms = session_duration_ms,
            "Iteration complete"
        );

        report(IterationResult::Completed {
            outcome,
            evaluation,
        })
    }

    async fn logout(&self, ctx: &CallContext, session: &Session) -> bool {
        let started = Instant::now();
        let (success, status) = match self.shared.api.logout(ctx, session).await {
            Ok(resp) => (resp.is_success(), Some(resp.status)),
            Err(err) => {
                debug!(vu_id = ctx.vu_id, error = %err, "Logout failed");
                (false, None)
            }
        };
        self.sample(ctx, LOGOUT_OPERATION, elapsed_ms(started), success, status);
        if !success {
            self.shared.metrics.inc_logout_failure();
        }
        success
    }

    fn sample(
        &self,
        ctx: &CallContext,
        operation: &str,
        duration_ms: f64,
        success: bool,
        status: Option<u16>,
    ) {
        let metrics = &self.shared.metrics;
        metrics.record_sample(OperationSample {
            operation: operation.to_string(),
            load_level: ctx.load_level,
            duration_ms,
            success,
            timestamp_ms: metrics.elapsed_ms(),
            vu_id: ctx.vu_id,
            status,
        });
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Spread one run seed into independent per-VU streams.
fn derive_seed(seed: u64, spawn_index: u64) -> u64 {
    seed ^ spawn_index.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiOperation, ApiResponse};
    use crate::detector::{BaselineTracker, DetectionState};
    use crate::load::RampTrend;
    use crate::scenario::ScenarioMix;
    use crate::scheduler::{RampSignal, RampState};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    /// Target with a fixed delay and switchable failure points.
    #[derive(Default)]
    struct Mock {
        fail_login: bool,
        reject_session: bool,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TargetApi for Mock {
        async fn authenticate(&self, _ctx: &CallContext) -> Result<Session, ApiError> {
            self.log.lock().push("login".into());
            tokio::time::sleep(Duration::from_millis(40)).await;
            if self.fail_login {
                Err(ApiError::Rejected { status: 401 })
            } else {
                Ok(Session {
                    token: Some("t".into()),
                })
            }
        }

        async fn verify_session(
            &self,
            _ctx: &CallContext,
            _session: &Session,
        ) -> Result<ApiResponse, ApiError> {
            self.log.lock().push("session".into());
            tokio::time::sleep(Duration::from_millis(60)).await;
            Ok(ApiResponse::new(if self.reject_session { 401 } else { 200 }))
        }

        async fn call(
            &self,
            _ctx: &CallContext,
            _session: &Session,
            op: &ApiOperation,
        ) -> Result<ApiResponse, ApiError> {
            self.log.lock().push(op.name.into());
            Ok(ApiResponse::new(200))
        }

        async fn logout(
            &self,
            _ctx: &CallContext,
            _session: &Session,
        ) -> Result<ApiResponse, ApiError> {
            self.log.lock().push("logout".into());
            Ok(ApiResponse::new(200))
        }
    }

    fn user(api: Arc<Mock>) -> (VirtualUser, Arc<VuShared>, watch::Sender<RampState>) {
        let metrics = Arc::new(MetricsRecorder::new());
        let tracker = BaselineTracker::new(Arc::new(DetectionState::new()), LoadLevel(25));
        let shared = Arc::new(VuShared {
            api: api.clone(),
            dispatcher: ScenarioDispatcher::new(api, metrics.clone(), ScenarioMix::default()),
            detector: BreakpointDetector::new(tracker, 3.0),
            metrics,
            levels: LoadLevels::new([10, 50]).unwrap(),
            active: ActiveUsers::new(),
            seed: Some(7),
        });
        let (tx, rx) = watch::channel(RampState {
            target: 1,
            trend: RampTrend::Rising,
        });
        let slot = VuSlot {
            slot: 0,
            spawn_index: 0,
            signal: RampSignal::new(0, rx),
        };
        (VirtualUser::new(shared.clone(), slot), shared, tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_iteration_captures_baseline() {
        let (mut vu, shared, _tx) = user(Arc::new(Mock::default()));
        let _guard = shared.active.enter();

        let report = vu.iterate().await;

        assert_eq!(report.load_level, LoadLevel(10));
        assert_eq!(report.phase, Phase::Baseline);
        match report.result {
            IterationResult::Completed { evaluation, .. } => {
                assert!(matches!(evaluation, Evaluation::BaselineCaptured(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        let baseline = shared.detector.tracker().baseline().unwrap();
        assert!((baseline.auth_duration_ms - 40.0).abs() < 1.0);
        assert!((baseline.session_duration_ms - 60.0).abs() < 1.0);
        assert_eq!(shared.metrics.iterations_completed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_abandons_iteration() {
        let api = Arc::new(Mock {
            fail_login: true,
            ..Mock::default()
        });
        let (mut vu, shared, _tx) = user(api.clone());

        let report = vu.iterate().await;

        assert_eq!(
            report.result,
            IterationResult::AuthFailed(ApiError::Rejected { status: 401 })
        );
        assert_eq!(*api.log.lock(), vec!["login".to_string()]);
        let samples = shared.metrics.snapshot();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].operation, LOGIN_OPERATION);
        assert_eq!(samples[0].status, Some(401));
        assert!(!samples[0].success);
        assert_eq!(shared.metrics.auth_failures(), 1);
        assert_eq!(shared.metrics.iterations_completed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_session_logs_out_without_evaluation() {
        let api = Arc::new(Mock {
            reject_session: true,
            ..Mock::default()
        });
        let (mut vu, shared, _tx) = user(api.clone());

        let report = vu.iterate().await;

        assert_eq!(report.result, IterationResult::SessionRejected);
        assert_eq!(*api.log.lock(), vec!["login", "session", "logout"]);
        assert!(shared.detector.tracker().baseline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_retired() {
        let (vu, shared, tx) = user(Arc::new(Mock::default()));
        let handle = tokio::spawn(vu.run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(shared.active.get(), 1);
        tx.send_replace(RampState {
            target: 0,
            trend: RampTrend::Falling,
        });
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(shared.active.get(), 0);
        assert!(shared.metrics.iterations_completed() >= 2);
    }

    #[test]
    fn test_derived_seeds_differ() {
        assert_ne!(derive_seed(1, 0), derive_seed(1, 1));
        assert_eq!(derive_seed(9, 3), derive_seed(9, 3));
    }
}
