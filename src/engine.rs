//! # Probe Engine
//!
//! Wires one run together: validates the configuration, checks the target
//! is reachable, builds the shared detection and metrics state, lets the
//! [`StageScheduler`] drive VUs through the ramp, and produces the
//! [`RunReport`] at teardown.
//!
//! A breakpoint never stops the run early. Only the end of the schedule or
//! the shutdown future (Ctrl-C in the CLI) does, and both still yield a
//! report.

use crate::client::{ApiError, HttpTargetApi, TargetApi};
use crate::config::{ConfigError, ProbeConfig};
use crate::detector::{BaselineTracker, BreakpointDetector, DetectionState};
use crate::ids::RunId;
use crate::load::LoadLevel;
use crate::metrics::MetricsRecorder;
use crate::report::{ReportInputs, RunReport};
use crate::scenario::{ScenarioDispatcher, ScenarioMix};
use crate::scheduler::{StageScheduler, VuSlot};
use crate::vu::{VirtualUser, VuShared};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};

/// Failures that prevent a run from starting.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build target client: {0}")]
    Client(ApiError),
    #[error("target failed preflight check: {0}")]
    Preflight(ApiError),
}

/// A configured run, ready to execute.
pub struct ProbeRun {
    id: RunId,
    config: ProbeConfig,
    api: Arc<dyn TargetApi>,
    metrics: Arc<MetricsRecorder>,
    detector: BreakpointDetector,
}

impl ProbeRun {
    /// Build a run against the HTTP target described by `config`.
    pub fn from_config(config: ProbeConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        let api = HttpTargetApi::new(&config.target).map_err(ProbeError::Client)?;
        Self::with_api(config, Arc::new(api))
    }

    /// Build a run against any [`TargetApi`].
    pub fn with_api(config: ProbeConfig, api: Arc<dyn TargetApi>) -> Result<Self, ProbeError> {
        config.validate()?;
        let tracker = BaselineTracker::new(
            Arc::new(DetectionState::new()),
            LoadLevel(config.detection.baseline_ceiling),
        );
        let detector = BreakpointDetector::new(tracker, config.detection.threshold);
        Ok(Self {
            id: RunId::new(),
            config,
            api,
            metrics: Arc::new(MetricsRecorder::new()),
            detector,
        })
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Live metrics, readable while the run is in flight and after it ends.
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn detector(&self) -> &BreakpointDetector {
        &self.detector
    }

    /// Execute the run until the schedule completes or `shutdown` resolves.
    pub async fn execute<F>(&self, shutdown: F) -> Result<RunReport, ProbeError>
    where
        F: Future<Output = ()>,
    {
        let span = info_span!("probe_run", run_id = %self.id);
        self.execute_inner(shutdown).instrument(span).await
    }

    async fn execute_inner<F>(&self, shutdown: F) -> Result<RunReport, ProbeError>
    where
        F: Future<Output = ()>,
    {
        let levels = self.config.load_levels()?;
        info!(
            base_url = %self.config.target.base_url,
            stages = self.config.stages.len(),
            total_s = self.config.total_duration().as_secs(),
            levels = ?levels.as_slice(),
            threshold = self.detector.threshold(),
            baseline_ceiling = self.detector.tracker().ceiling().get(),
            "Starting probe run"
        );

        if self.config.target.skip_preflight {
            info!("Preflight check skipped");
        } else {
            self.api.preflight().await.map_err(|e| {
                error!(error = %e, "Preflight check failed");
                ProbeError::Preflight(e)
            })?;
        }

        let scheduler = StageScheduler::from_config(&self.config);
        let shared = Arc::new(VuShared {
            api: self.api.clone(),
            dispatcher: ScenarioDispatcher::new(
                self.api.clone(),
                self.metrics.clone(),
                ScenarioMix::from_weights(&self.config.scenarios),
            ),
            detector: self.detector.clone(),
            metrics: self.metrics.clone(),
            levels,
            active: scheduler.active_users(),
            seed: self.config.seed,
        });

        self.metrics.start_clock();
        let started = Instant::now();
        let spawn = |slot: VuSlot| {
            let vu = VirtualUser::new(shared.clone(), slot);
            let span = info_span!("vu", vu_id = vu.id());
            tokio::spawn(vu.run().instrument(span))
        };
        let outcome = scheduler.run(spawn, shutdown).await;

        let report = RunReport::build(ReportInputs {
            run_id: self.id,
            completed: outcome.completed,
            wall_clock: started.elapsed(),
            threshold: self.detector.threshold(),
            safe_capacity_factor: self.config.detection.safe_capacity_factor,
            vus_spawned: outcome.vus_spawned,
            baseline: self.detector.tracker().baseline(),
            breakpoint: self.detector.breakpoint(),
            summary: self.metrics.summary(),
        });

        info!(
            completed = report.completed,
            breakpoint_detected = report.breakpoint.detected,
            breakpoint_level = ?report.breakpoint.load_level.map(LoadLevel::get),
            safe_capacity = ?report.safe_capacity,
            samples = report.summary.total_samples,
            aborted_vus = outcome.aborted,
            "Probe run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiOperation, ApiResponse, CallContext, Session};
    use crate::config::{LoadStage, RampMode};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl TargetApi for Unreachable {
        async fn preflight(&self) -> Result<(), ApiError> {
            Err(ApiError::Transport("connection refused".into()))
        }

        async fn authenticate(&self, _ctx: &CallContext) -> Result<Session, ApiError> {
            Err(ApiError::Timeout)
        }

        async fn verify_session(
            &self,
            _ctx: &CallContext,
            _session: &Session,
        ) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Timeout)
        }

        async fn call(
            &self,
            _ctx: &CallContext,
            _session: &Session,
            _op: &ApiOperation,
        ) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Timeout)
        }

        async fn logout(
            &self,
            _ctx: &CallContext,
            _session: &Session,
        ) -> Result<ApiResponse, ApiError> {
            Err(ApiError::Timeout)
        }
    }

    /// Passes preflight after a delay, then behaves like [`Unreachable`].
    struct SlowPreflight(Duration);

    #[async_trait]
    impl TargetApi for SlowPreflight {
        async fn preflight(&self) -> Result<(), ApiError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }

        async fn authenticate(&self, ctx: &CallContext) -> Result<Session, ApiError> {
            Unreachable.authenticate(ctx).await
        }

        async fn verify_session(
            &self,
            ctx: &CallContext,
            session: &Session,
        ) -> Result<ApiResponse, ApiError> {
            Unreachable.verify_session(ctx, session).await
        }

        async fn call(
            &self,
            ctx: &CallContext,
            session: &Session,
            op: &ApiOperation,
        ) -> Result<ApiResponse, ApiError> {
            Unreachable.call(ctx, session, op).await
        }

        async fn logout(
            &self,
            ctx: &CallContext,
            session: &Session,
        ) -> Result<ApiResponse, ApiError> {
            Unreachable.logout(ctx, session).await
        }
    }

    fn config() -> ProbeConfig {
        ProbeConfig {
            stages: vec![LoadStage::new(2, Duration::from_secs(10))],
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProbeConfig {
            stages: Vec::new(),
            ..ProbeConfig::default()
        };
        assert!(matches!(
            ProbeRun::with_api(config, Arc::new(Unreachable)),
            Err(ProbeError::Config(ConfigError::EmptyStages))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_failure_is_fatal() {
        let run = ProbeRun::with_api(config(), Arc::new(Unreachable)).unwrap();
        let err = run.execute(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Preflight(ApiError::Transport(_))));
        assert_eq!(run.metrics().sample_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failures_still_report() {
        let mut config = config();
        config.target.skip_preflight = true;
        let run = ProbeRun::with_api(config, Arc::new(Unreachable)).unwrap();

        let report = run.execute(std::future::pending()).await.unwrap();

        assert!(report.completed);
        assert!(report.baseline.is_none());
        assert!(!report.breakpoint.detected);
        assert!(report.summary.auth_failures > 0);
        assert_eq!(report.summary.auth_failures, report.summary.total_samples);
        assert_eq!(report.summary.iterations_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_clock_starts_after_preflight() {
        let mut config = config();
        config.ramp.mode = RampMode::Step;
        let run =
            ProbeRun::with_api(config, Arc::new(SlowPreflight(Duration::from_secs(60)))).unwrap();

        run.execute(std::future::pending()).await.unwrap();

        let samples = run.metrics().snapshot();
        assert!(!samples.is_empty());
        assert!(
            samples[0].timestamp_ms < 1000,
            "first sample at {}ms includes preflight time",
            samples[0].timestamp_ms
        );
    }
}
