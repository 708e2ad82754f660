use brrtprobe::cli::{run_cli, Cli};
use brrtprobe::otel::{init_logging, LogConfig};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&LogConfig::from_env())?;
    run_cli(cli).await
}
