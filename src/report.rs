//! # Run Report
//!
//! Built once at teardown from the final detection state and the metrics
//! summary. Serialises to JSON for `--report-out` and renders as a text
//! block for the terminal.

use crate::detector::{Baseline, BreakpointRecord};
use crate::ids::RunId;
use crate::load::LoadLevel;
use crate::metrics::MetricsSummary;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::time::Duration;

const RULE: &str = "══════════════════════════════════════════════════════════════════════";

/// Outcome of a probe run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// False when the run was interrupted before the last stage ended.
    pub completed: bool,
    pub wall_clock_ms: u64,
    /// Degradation multiple that marks a breakpoint.
    pub threshold: f64,
    /// Highest load level any sample was tagged with.
    pub max_tested_level: Option<LoadLevel>,
    pub baseline: Option<Baseline>,
    pub breakpoint: BreakpointRecord,
    /// `floor(breakpoint level × factor)`, when a breakpoint was found.
    pub safe_capacity: Option<usize>,
    pub safe_capacity_factor: f64,
    pub vus_spawned: u64,
    pub summary: MetricsSummary,
}

/// Inputs gathered by the engine at teardown.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub run_id: RunId,
    pub completed: bool,
    pub wall_clock: Duration,
    pub threshold: f64,
    pub safe_capacity_factor: f64,
    pub vus_spawned: u64,
    pub baseline: Option<Baseline>,
    pub breakpoint: BreakpointRecord,
    pub summary: MetricsSummary,
}

/// Recommended sustained concurrency for a breakpoint level.
pub fn safe_capacity(level: LoadLevel, factor: f64) -> usize {
    // 90 × 0.7 evaluates to 62.99999999999999; the epsilon keeps it at 63.
    (level.get() as f64 * factor + SAFE_CAPACITY_EPSILON).floor() as usize
}

const SAFE_CAPACITY_EPSILON: f64 = 1e-9;

impl RunReport {
    pub fn build(inputs: ReportInputs) -> Self {
        let max_tested_level = inputs
            .summary
            .by_load_level
            .iter()
            .filter_map(|row| row.key.parse::<usize>().ok())
            .max()
            .map(LoadLevel);
        let safe_capacity = inputs
            .breakpoint
            .load_level
            .filter(|_| inputs.breakpoint.detected)
            .map(|level| safe_capacity(level, inputs.safe_capacity_factor));

        Self {
            run_id: inputs.run_id,
            completed: inputs.completed,
            wall_clock_ms: inputs.wall_clock.as_millis() as u64,
            threshold: inputs.threshold,
            max_tested_level,
            baseline: inputs.baseline,
            breakpoint: inputs.breakpoint,
            safe_capacity,
            safe_capacity_factor: inputs.safe_capacity_factor,
            vus_spawned: inputs.vus_spawned,
            summary: inputs.summary,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "╔{RULE}╗")?;
        writeln!(f, "  Breakpoint probe report  run {}", self.run_id)?;
        writeln!(f, "╚{RULE}╝")?;
        writeln!(
            f,
            "  Duration: {:.1}s{}",
            self.wall_clock_ms as f64 / 1000.0,
            if self.completed { "" } else { " (interrupted)" }
        )?;
        writeln!(f)?;

        writeln!(f, "Baseline:")?;
        match &self.baseline {
            Some(b) => {
                writeln!(f, "  Captured at load level {}", b.load_level)?;
                writeln!(f, "  Session: {:.1}ms", b.session_duration_ms)?;
                writeln!(f, "  Auth:    {:.1}ms", b.auth_duration_ms)?;
            }
            None => writeln!(f, "  Not captured")?,
        }
        writeln!(f)?;

        let bp = &self.breakpoint;
        match (bp.detected, bp.load_level) {
            (true, Some(level)) => {
                writeln!(f, "Breaking Point Identified 🎯")?;
                writeln!(f, "  Load level: {level} concurrent users")?;
                writeln!(
                    f,
                    "  Session degradation: {:.2}x baseline",
                    bp.session_degradation_ratio
                )?;
                writeln!(
                    f,
                    "  Auth degradation:    {:.2}x baseline",
                    bp.auth_degradation_ratio
                )?;
                writeln!(f)?;
                writeln!(f, "Recommendation:")?;
                if let Some(capacity) = self.safe_capacity {
                    writeln!(
                        f,
                        "  Safe capacity: {capacity} concurrent users ({:.0}% of breakpoint)",
                        self.safe_capacity_factor * 100.0
                    )?;
                }
            }
            _ => {
                writeln!(f, "No breakpoint detected")?;
                match self.max_tested_level {
                    Some(level) => writeln!(
                        f,
                        "  System stable through maximum tested load level {level}"
                    )?,
                    None => writeln!(f, "  No load level was exercised")?,
                }
                writeln!(
                    f,
                    "  Latency never exceeded {}x baseline",
                    self.threshold
                )?;
            }
        }
        writeln!(f)?;

        let s = &self.summary;
        writeln!(f, "Totals:")?;
        writeln!(f, "  VUs spawned:          {}", self.vus_spawned)?;
        writeln!(
            f,
            "  Iterations:           {} started, {} completed",
            s.iterations_started, s.iterations_completed
        )?;
        writeln!(f, "  Samples:              {}", s.total_samples)?;
        writeln!(f, "  Error rate:           {:.2}%", s.error_rate)?;
        writeln!(f, "  Auth failures:        {}", s.auth_failures)?;
        writeln!(f, "  Logout failures:      {}", s.logout_failures)?;
        if let Some(ratio) = s.mean_health_ratio {
            writeln!(f, "  Mean health ratio:    {:.3}", ratio)?;
        }

        if !s.by_load_level.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "  {:>6} {:>9} {:>8} {:>10} {:>10} {:>10}",
                "level", "samples", "errors", "p50 ms", "p95 ms", "p99 ms"
            )?;
            for row in &s.by_load_level {
                writeln!(
                    f,
                    "  {:>6} {:>9} {:>7.2}% {:>10.1} {:>10.1} {:>10.1}",
                    row.key, row.count, row.error_rate, row.p50_ms, row.p95_ms, row.p99_ms
                )?;
            }
        }
        Ok(())
    }
}
