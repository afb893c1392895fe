use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use rendercache::config::Config as RenderCacheConfig;
use rendercache::logging::ensure_log_error;
use stresstest::perform_stresstest;
use workloads::WorkloadsConfig;

mod logging;
mod stresstest;
mod workloads;

/// Command line interface parser.
#[derive(Parser)]
#[command(version, about = "Hammers a render cache with concurrent workloads")]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: PathBuf,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Print logs to the console as configured, instead of discarding them.
    #[arg(long)]
    log: bool,
}

fn main() {
    if let Err(error) = run() {
        ensure_log_error(&error);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // parse configs
    let workloads_file =
        std::fs::File::open(cli.workloads).context("failed to open workloads file")?;
    let workloads: WorkloadsConfig =
        serde_yaml::from_reader(workloads_file).context("failed to parse workloads YAML")?;

    let config_path = cli.config;
    let config = RenderCacheConfig::get(config_path.as_deref())?;

    if cli.log {
        // SAFETY: No other threads have been spawned yet.
        unsafe { rendercache::logging::init_logging(&config) };
    }
    let logging_guard = logging::init(
        logging::Config {
            // we want to have tracing and metrics enabled, to closely match the production setup
            backtraces: true,
            tracing: !cli.log,
            metrics: true,
        },
        &config,
    )?;

    let runtime = tokio::runtime::Runtime::new()?;
    if let Some(udp_sink) = logging_guard.udp_sink {
        runtime.spawn(udp_sink);
    }

    runtime.block_on(perform_stresstest(config, workloads, cli.duration))
}
