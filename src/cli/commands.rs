use crate::config::duration::format_duration;
use crate::config::{ProbeConfig, RampMode};
use crate::engine::ProbeRun;
use crate::load::{LoadLevel, Phase};
use crate::scheduler::RampSchedule;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Command-line interface for brrtprobe
///
/// Drives a target service through a concurrency ramp and reports the load
/// level at which session latency breaks down.
#[derive(Parser)]
#[command(name = "brrtprobe")]
#[command(about = "Adaptive load probe with breakpoint detection", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available brrtprobe commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the ramp against the target and report the breakpoint
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Write every recorded sample as JSON
        #[arg(long)]
        samples_out: Option<PathBuf>,

        /// Write the final report as JSON
        #[arg(long)]
        report_out: Option<PathBuf>,

        /// Write aggregates in Prometheus text format
        #[arg(long)]
        prometheus_out: Option<PathBuf>,
    },
    /// Print the ramp schedule without contacting the target
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Load and validate the configuration, then exit
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

/// Options shared by every command that reads a configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the YAML configuration (defaults apply when omitted)
    #[arg(short, long, env = "BRRTPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the target base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Seed scenario draws for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the ramp mode
    #[arg(long, value_enum)]
    pub ramp_mode: Option<RampModeArg>,

    /// Skip the reachability check before the run
    #[arg(long, default_value_t = false)]
    pub skip_preflight: bool,
}

/// Ramp mode as accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RampModeArg {
    Linear,
    Step,
}

impl From<RampModeArg> for RampMode {
    fn from(arg: RampModeArg) -> Self {
        match arg {
            RampModeArg::Linear => RampMode::Linear,
            RampModeArg::Step => RampMode::Step,
        }
    }
}

impl ConfigArgs {
    /// File, then environment, then flags; validated after every layer.
    pub fn load(&self) -> Result<ProbeConfig> {
        let mut config = ProbeConfig::load(self.config.as_deref()).with_context(|| {
            match &self.config {
                Some(p) => format!("Failed to load configuration from {}", p.display()),
                None => "Failed to load default configuration".to_string(),
            }
        })?;
        if let Some(url) = &self.base_url {
            config.target.base_url = url.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(mode) = self.ramp_mode {
            config.ramp.mode = mode.into();
        }
        if self.skip_preflight {
            config.target.skip_preflight = true;
        }
        config
            .validate()
            .context("Invalid configuration after command-line overrides")?;
        Ok(config)
    }
}

/// Execute a parsed command line.
pub async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            config,
            samples_out,
            report_out,
            prometheus_out,
        } => {
            let config = config.load()?;
            let run = ProbeRun::from_config(config).context("Failed to set up probe run")?;
            info!(run_id = %run.id(), "Probe run created");

            let report = run
                .execute(shutdown_signal())
                .await
                .context("Probe run aborted")?;

            println!("{report}");

            let metrics = run.metrics();
            if let Some(path) = samples_out {
                write_json(&path, &metrics.snapshot())?;
                info!(path = %path.display(), "Samples written");
            }
            if let Some(path) = report_out {
                write_json(&path, &report)?;
                info!(path = %path.display(), "Report written");
            }
            if let Some(path) = prometheus_out {
                std::fs::write(&path, metrics.render_prometheus())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Prometheus metrics written");
            }
            Ok(())
        }
        Commands::Plan { config } => {
            let config = config.load()?;
            print!("{}", render_plan(&config)?);
            Ok(())
        }
        Commands::Validate { config } => {
            let config = config.load()?;
            println!(
                "Configuration OK: {} stages, {} total, levels {:?}",
                config.stages.len(),
                format_duration(config.total_duration()),
                config.load_levels()?.as_slice()
            );
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; run will stop only at schedule end");
        std::future::pending::<()>().await;
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Human-readable stage table.
///
/// Stages that ramp down are labelled `recovery`, as iterations run during
/// them would be.
pub fn render_plan(config: &ProbeConfig) -> Result<String> {
    let levels = config.load_levels()?;
    let schedule = RampSchedule::new(config.stages.clone(), config.ramp.mode);
    let mut out = String::new();
    writeln!(out, "Target: {}", config.target.base_url)?;
    writeln!(out, "Ramp mode: {:?}", schedule.mode())?;
    writeln!(
        out,
        "{:>5} {:>8} {:>9} {:>9}  {}",
        "stage", "target", "duration", "ends at", "phase"
    )?;

    let mut start = Duration::ZERO;
    for (i, stage) in schedule.stages().iter().enumerate() {
        let trend = schedule.trend_at(start);
        start += stage.duration;
        let phase = Phase::for_iteration(levels.level_for(stage.target), trend);
        writeln!(
            out,
            "{:>5} {:>8} {:>9} {:>9}  {}",
            i + 1,
            stage.target,
            format_duration(stage.duration),
            format_duration(start),
            phase
        )?;
    }

    writeln!(
        out,
        "Total duration: {}",
        format_duration(schedule.total_duration())
    )?;
    writeln!(out, "Load levels: {:?}", levels.as_slice())?;
    writeln!(
        out,
        "Baseline captured at or below level {}; breakpoint when latency exceeds {}x baseline",
        LoadLevel(config.detection.baseline_ceiling),
        config.detection.threshold
    )?;
    Ok(out)
}
