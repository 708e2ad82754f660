use super::{MetricsRecorder, OperationSample};
use crate::load::LoadLevel;
use serde::Serialize;
use std::collections::BTreeMap;

/// Latency and error statistics for one group of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub key: String,
    pub count: u64,
    pub failures: u64,
    /// Failed share of `count`, in percent.
    pub error_rate: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

/// Aggregated view of a run's samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_samples: u64,
    pub failed_samples: u64,
    pub error_rate: f64,
    pub iterations_started: u64,
    pub iterations_completed: u64,
    pub auth_failures: u64,
    pub logout_failures: u64,
    /// Mean health ratio over all health-check iterations, if any ran.
    pub mean_health_ratio: Option<f64>,
    pub by_operation: Vec<StatsRow>,
    pub by_load_level: Vec<StatsRow>,
}

impl MetricsRecorder {
    /// Summarise everything recorded so far.
    pub fn summary(&self) -> MetricsSummary {
        let samples = self.snapshot();
        let health = self.health_snapshot();

        let mut by_operation: BTreeMap<&str, Vec<&OperationSample>> = BTreeMap::new();
        let mut by_level: BTreeMap<LoadLevel, Vec<&OperationSample>> = BTreeMap::new();
        for s in &samples {
            by_operation.entry(s.operation.as_str()).or_default().push(s);
            by_level.entry(s.load_level).or_default().push(s);
        }

        let failed = samples.iter().filter(|s| !s.success).count() as u64;
        let mean_health_ratio = if health.is_empty() {
            None
        } else {
            Some(health.iter().map(|h| h.health_ratio).sum::<f64>() / health.len() as f64)
        };

        MetricsSummary {
            total_samples: samples.len() as u64,
            failed_samples: failed,
            error_rate: percent(failed, samples.len() as u64),
            iterations_started: self.iterations_started(),
            iterations_completed: self.iterations_completed(),
            auth_failures: self.auth_failures(),
            logout_failures: self.logout_failures(),
            mean_health_ratio,
            by_operation: by_operation
                .into_iter()
                .map(|(k, v)| stats_row(k.to_string(), &v))
                .collect(),
            by_load_level: by_level
                .into_iter()
                .map(|(k, v)| stats_row(k.to_string(), &v))
                .collect(),
        }
    }
}

fn stats_row(key: String, samples: &[&OperationSample]) -> StatsRow {
    let mut durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
    durations.sort_by(|a, b| a.total_cmp(b));
    let failures = samples.iter().filter(|s| !s.success).count() as u64;
    let count = samples.len() as u64;

    StatsRow {
        key,
        count,
        failures,
        error_rate: percent(failures, count),
        mean_ms: mean(&durations),
        p50_ms: percentile(&durations, 0.50),
        p95_ms: percentile(&durations, 0.95),
        p99_ms: percentile(&durations, 0.99),
        max_ms: durations.last().copied().unwrap_or(0.0),
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Percentile at the rounded linear rank `round((n - 1) × p)` of already sorted data.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
