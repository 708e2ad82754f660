use super::summary::percentile;
use super::MetricsRecorder;
use crate::load::LoadLevel;
use std::collections::BTreeMap;

impl MetricsRecorder {
    /// Export the recorder in Prometheus text exposition format.
    ///
    /// Counters come from the running aggregates; the latency summary
    /// quantiles are computed from the raw samples.
    pub fn render_prometheus(&self) -> String {
        let aggregates = self.aggregates();
        let mut output = String::with_capacity(4096);

        output.push_str("# HELP brrtprobe_operations_total Operations executed, by outcome\n");
        output.push_str("# TYPE brrtprobe_operations_total counter\n");
        for ((op, level), agg) in &aggregates {
            output.push_str(&format!(
                "brrtprobe_operations_total{{operation=\"{}\",load_level=\"{}\",outcome=\"success\"}} {}\n",
                op,
                level,
                agg.count - agg.failures
            ));
            output.push_str(&format!(
                "brrtprobe_operations_total{{operation=\"{}\",load_level=\"{}\",outcome=\"failure\"}} {}\n",
                op, level, agg.failures
            ));
        }

        let mut durations: BTreeMap<(String, LoadLevel), Vec<f64>> = BTreeMap::new();
        for s in self.snapshot() {
            durations
                .entry((s.operation, s.load_level))
                .or_default()
                .push(s.duration_ms);
        }

        output.push_str("# HELP brrtprobe_operation_duration_ms Operation duration in milliseconds\n");
        output.push_str("# TYPE brrtprobe_operation_duration_ms summary\n");
        for ((op, level), agg) in &aggregates {
            if let Some(values) = durations.get_mut(&(op.clone(), *level)) {
                values.sort_by(|a, b| a.total_cmp(b));
                for q in [0.5, 0.95, 0.99] {
                    output.push_str(&format!(
                        "brrtprobe_operation_duration_ms{{operation=\"{}\",load_level=\"{}\",quantile=\"{}\"}} {:.3}\n",
                        op,
                        level,
                        q,
                        percentile(values, q)
                    ));
                }
            }
            output.push_str(&format!(
                "brrtprobe_operation_duration_ms_sum{{operation=\"{}\",load_level=\"{}\"}} {:.3}\n",
                op, level, agg.total_ms
            ));
            output.push_str(&format!(
                "brrtprobe_operation_duration_ms_count{{operation=\"{}\",load_level=\"{}\"}} {}\n",
                op, level, agg.count
            ));
        }

        output.push_str("# HELP brrtprobe_iterations_total VU iterations started\n");
        output.push_str("# TYPE brrtprobe_iterations_total counter\n");
        output.push_str(&format!(
            "brrtprobe_iterations_total {}\n",
            self.iterations_started()
        ));

        output.push_str("# HELP brrtprobe_auth_failures_total Failed authentications\n");
        output.push_str("# TYPE brrtprobe_auth_failures_total counter\n");
        output.push_str(&format!(
            "brrtprobe_auth_failures_total {}\n",
            self.auth_failures()
        ));

        let health = self.health_snapshot();
        if let Some(last) = health.last() {
            output.push_str("# HELP brrtprobe_health_ratio Most recent health-check success ratio\n");
            output.push_str("# TYPE brrtprobe_health_ratio gauge\n");
            output.push_str(&format!(
                "brrtprobe_health_ratio{{load_level=\"{}\"}} {:.3}\n",
                last.load_level, last.health_ratio
            ));
        }

        output
    }
}
