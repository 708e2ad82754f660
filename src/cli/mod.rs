//! # CLI Module
//!
//! Command-line front end for the probe.
//!
//! ## Commands
//!
//! ### `run`
//!
//! Execute the ramp against the target and print the report:
//!
//! ```bash
//! brrtprobe run --config probe.yaml --report-out report.json --samples-out samples.json
//! ```
//!
//! Options:
//! - `--config <FILE>` - YAML configuration (or `BRRTPROBE_CONFIG`)
//! - `--base-url <URL>` - override the target
//! - `--seed <N>` - reproducible scenario draws
//! - `--ramp-mode <linear|step>` - override the ramp shape
//! - `--skip-preflight` - do not check the health endpoint first
//! - `--samples-out`, `--report-out`, `--prometheus-out` - output files
//!
//! Ctrl-C ends the ramp early; VUs finish their iteration and the report is
//! still printed.
//!
//! ### `plan`
//!
//! Print the stage table, cumulative timings and load levels without
//! touching the target.
//!
//! ### `validate`
//!
//! Load the configuration with all overrides applied and exit non-zero if it
//! is invalid.

mod commands;


pub use commands::{render_plan, run_cli, Cli, Commands, ConfigArgs, RampModeArg};
