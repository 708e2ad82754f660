use super::{plan_for, ScenarioKind, ScenarioMix};
use crate::client::{CallContext, Session, TargetApi};
use crate::metrics::{HealthObservation, MetricsRecorder, OperationSample};
use crate::tolerance::expected_ceiling;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Summary of one executed category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationOutcome {
    pub kind: ScenarioKind,
    pub operations: usize,
    pub successes: usize,
    pub total_ms: f64,
    /// Set for health-check iterations only.
    pub health_ratio: Option<f64>,
}

impl IterationOutcome {
    pub fn failures(&self) -> usize {
        self.operations - self.successes
    }
}

/// Picks and runs workload categories against the target.
#[derive(Clone)]
pub struct ScenarioDispatcher {
    api: Arc<dyn TargetApi>,
    metrics: Arc<MetricsRecorder>,
    mix: ScenarioMix,
}

impl ScenarioDispatcher {
    pub fn new(api: Arc<dyn TargetApi>, metrics: Arc<MetricsRecorder>, mix: ScenarioMix) -> Self {
        Self { api, metrics, mix }
    }

    /// Draw the category for the next iteration.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> ScenarioKind {
        self.mix.sample(rng)
    }

    /// Run every operation of `kind` once, in order.
    pub async fn execute(
        &self,
        kind: ScenarioKind,
        ctx: &CallContext,
        session: &Session,
    ) -> IterationOutcome {
        let plan = plan_for(kind);
        let ceiling = expected_ceiling(plan.base_expected, ctx.load_level);
        let ceiling_ms = ceiling.as_secs_f64() * 1000.0;

        let mut successes = 0;
        let mut total_ms = 0.0;
        for op in plan.operations {
            let start = Instant::now();
            let result = self.api.call(ctx, session, op).await;
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

            let status = match &result {
                Ok(resp) => Some(resp.status),
                Err(err) => {
                    debug!(
                        vu_id = ctx.vu_id,
                        operation = op.name,
                        error = %err,
                        "Operation failed"
                    );
                    None
                }
            };
            let success =
                status.is_some_and(|s| plan.status_check.passes(s)) && duration_ms <= ceiling_ms;
            if success {
                successes += 1;
            }
            total_ms += duration_ms;

            debug!(
                vu_id = ctx.vu_id,
                iteration = ctx.iteration,
                operation = op.name,
                load_level = ctx.load_level.get(),
                duration_ms,
                status = ?status,
                success,
                "Operation complete"
            );
            self.metrics.record_sample(OperationSample {
                operation: op.name.to_string(),
                load_level: ctx.load_level,
                duration_ms,
                success,
                timestamp_ms: self.metrics.elapsed_ms(),
                vu_id: ctx.vu_id,
                status,
            });

            tokio::time::sleep(plan.inter_op_delay).await;
        }

        let operations = plan.operations.len();
        let health_ratio = (kind == ScenarioKind::HealthCheck).then(|| {
            let ratio = successes as f64 / operations as f64;
            self.metrics.record_health(HealthObservation {
                load_level: ctx.load_level,
                health_ratio: ratio,
                avg_response_ms: total_ms / operations as f64,
                timestamp_ms: self.metrics.elapsed_ms(),
            });
            ratio
        });

        IterationOutcome {
            kind,
            operations,
            successes,
            total_ms,
            health_ratio,
        }
    }
}
