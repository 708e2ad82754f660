//! # Metrics Recorder
//!
//! Append-only store of every [`OperationSample`] taken during a run, plus a
//! few run-level counters.
//!
//! Samples live in a mutex-guarded `Vec` so that one VU's samples keep the
//! order its operations executed in. Alongside the raw samples the recorder
//! keeps per `(operation, load level)` running aggregates in a [`DashMap`];
//! those are cheap to read while the run is in flight (progress logs,
//! Prometheus export) without copying the sample vector.
//!
//! Nothing is evicted. Runs are bounded in time and the sample count is
//! bounded by VUs × iterations.

mod prometheus;
mod summary;

pub use summary::{MetricsSummary, StatsRow};

use crate::load::LoadLevel;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// One executed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSample {
    pub operation: String,
    pub load_level: LoadLevel,
    pub duration_ms: f64,
    pub success: bool,
    /// Offset from run start, in milliseconds.
    pub timestamp_ms: u64,
    pub vu_id: usize,
    /// HTTP status when the call produced a response.
    pub status: Option<u16>,
}

/// Aggregate result of one health-check iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthObservation {
    pub load_level: LoadLevel,
    /// Successful calls divided by total calls.
    pub health_ratio: f64,
    pub avg_response_ms: f64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Aggregate {
    pub count: u64,
    pub failures: u64,
    pub total_ms: f64,
    pub max_ms: f64,
}

/// Thread-safe sample store shared by all VUs of a run.
pub struct MetricsRecorder {
    started: Mutex<Instant>,
    samples: Mutex<Vec<OperationSample>>,
    health: Mutex<Vec<HealthObservation>>,
    aggregates: DashMap<(String, LoadLevel), Aggregate>,
    iterations_started: AtomicU64,
    iterations_completed: AtomicU64,
    auth_failures: AtomicU64,
    logout_failures: AtomicU64,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    /// Create an empty recorder; timestamps are measured from now until
    /// [`start_clock`](Self::start_clock) resets the origin.
    pub fn new() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            samples: Mutex::new(Vec::new()),
            health: Mutex::new(Vec::new()),
            aggregates: DashMap::new(),
            iterations_started: AtomicU64::new(0),
            iterations_completed: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            logout_failures: AtomicU64::new(0),
        }
    }

    /// Reset the timestamp origin to now.
    pub fn start_clock(&self) {
        *self.started.lock() = Instant::now();
    }

    /// Milliseconds since the clock was last started.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.lock().elapsed().as_millis() as u64
    }

    /// Append a sample with no VU or status attached.
    pub fn record(&self, operation: &str, load_level: LoadLevel, duration_ms: f64, success: bool) {
        self.record_sample(OperationSample {
            operation: operation.to_string(),
            load_level,
            duration_ms,
            success,
            timestamp_ms: self.elapsed_ms(),
            vu_id: 0,
            status: None,
        });
    }

    /// Append a fully populated sample.
    pub fn record_sample(&self, sample: OperationSample) {
        {
            let mut agg = self
                .aggregates
                .entry((sample.operation.clone(), sample.load_level))
                .or_default();
            agg.count += 1;
            if !sample.success {
                agg.failures += 1;
            }
            agg.total_ms += sample.duration_ms;
            if sample.duration_ms > agg.max_ms {
                agg.max_ms = sample.duration_ms;
            }
        }
        self.samples.lock().push(sample);
    }

    pub fn record_health(&self, observation: HealthObservation) {
        self.health.lock().push(observation);
    }

    pub fn inc_iterations_started(&self) {
        self.iterations_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_iterations_completed(&self) {
        self.iterations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logout_failure(&self) {
        self.logout_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations_started(&self) -> u64 {
        self.iterations_started.load(Ordering::Relaxed)
    }

    pub fn iterations_completed(&self) -> u64 {
        self.iterations_completed.load(Ordering::Relaxed)
    }

    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }

    pub fn logout_failures(&self) -> u64 {
        self.logout_failures.load(Ordering::Relaxed)
    }

    /// Number of samples recorded so far.
    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Copy of every sample recorded so far.
    pub fn snapshot(&self) -> Vec<OperationSample> {
        self.samples.lock().clone()
    }

    /// Copy of every health observation recorded so far.
    pub fn health_snapshot(&self) -> Vec<HealthObservation> {
        self.health.lock().clone()
    }

    /// Running `(count, failures)` across all operations, read from the aggregates.
    pub fn totals(&self) -> (u64, u64) {
        self.aggregates
            .iter()
            .fold((0, 0), |(c, f), e| (c + e.count, f + e.failures))
    }

    pub(crate) fn aggregates(&self) -> Vec<((String, LoadLevel), Aggregate)> {
        let mut out: Vec<_> = self
            .aggregates
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
