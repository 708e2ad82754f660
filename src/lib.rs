//! # brrtprobe
//!
//! **brrtprobe** is an adaptive load generator that finds the concurrency
//! level at which a service's session and authentication latency breaks
//! down, and recommends a safe operating capacity below it.
//!
//! ## Overview
//!
//! A run drives the target through a table of concurrency stages. Every
//! virtual user (VU) loops iterations: log in, verify the session, run one
//! weighted workload category, log out. Each operation is timed and recorded
//! with the load level that was active when the iteration started.
//!
//! The first session completed at low load becomes the **baseline**. From
//! then on every session is compared against it, and the first one whose
//! session or auth latency exceeds the threshold multiple (3x by default)
//! latches the **breakpoint**. The latch is permanent; the run carries on to
//! the end of the schedule so the report covers recovery as well.
//!
//! ## Architecture
//!
//! - **[`config`]** - YAML configuration, environment overrides, validation
//! - **[`load`]** - load-level bucketing and phases
//! - **[`tolerance`]** - load-scaled latency tolerance and think time
//! - **[`client`]** - the [`client::TargetApi`] boundary and its HTTP implementation
//! - **[`scenario`]** - weighted workload categories and their dispatcher
//! - **[`metrics`]** - thread-safe sample store, summaries, Prometheus text
//! - **[`detector`]** - baseline capture and breakpoint latch
//! - **[`scheduler`]** - ramp schedule and VU slot management
//! - **[`vu`]** - the per-VU iteration loop
//! - **[`engine`]** - wiring for one run
//! - **[`report`]** - teardown report
//! - **[`otel`]** - logging setup
//! - **[`cli`]** - command-line front end
//!
//! ### Iteration Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Sched as StageScheduler
//!     participant VU as VirtualUser
//!     participant API as TargetApi
//!     participant Disp as ScenarioDispatcher
//!     participant Metrics as MetricsRecorder
//!     participant Det as BreakpointDetector
//!
//!     Sched->>VU: spawn into slot n (n < target)
//!     loop until slot retired
//!         VU->>VU: level = bucket(active users)
//!         VU->>API: authenticate
//!         API-->>VU: Session
//!         VU->>API: verify_session
//!         VU->>Disp: execute(category)
//!         Disp->>API: call(op) x N
//!         Disp->>Metrics: record_sample
//!         VU->>API: logout
//!         VU->>Det: evaluate(SessionRecord)
//!         Det-->>VU: Evaluation
//!         VU->>VU: think time
//!     end
//!     Sched->>VU: target drops below n
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Inspect the default ramp
//! brrtprobe plan
//!
//! # Probe a local service
//! BRRTPROBE_USERNAME=load BRRTPROBE_PASSWORD=secret \
//!   brrtprobe run --base-url http://localhost:8080 --report-out report.json
//! ```
//!
//! ## Library Use
//!
//! ```rust,ignore
//! use brrtprobe::config::ProbeConfig;
//! use brrtprobe::engine::ProbeRun;
//!
//! let config = ProbeConfig::load(Some("probe.yaml".as_ref()))?;
//! let run = ProbeRun::from_config(config)?;
//! let report = run.execute(std::future::pending()).await?;
//! println!("{report}");
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod detector;
pub mod engine;
pub mod ids;
pub mod load;
pub mod metrics;
pub mod otel;
pub mod report;
pub mod scenario;
pub mod scheduler;
pub mod tolerance;
pub mod vu;

pub use config::{ConfigError, ProbeConfig};
pub use engine::{ProbeError, ProbeRun};
pub use ids::RunId;
pub use report::RunReport;
