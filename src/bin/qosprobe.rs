use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use qosprobe::probe::{init_logging_with_config, Config, Orchestrator, StreamOutcome};
use tracing::{error, info, warn};

fn main() {
    // Parse CLI arguments
    let config = Config::parse();

    // Initialize structured logging with config options
    init_logging_with_config(&config.log_level, config.is_json_format());

    // Validate configuration
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config) {
        error!(error = %e, "Probe failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<()> {
    info!(
        server = %config.server,
        duration_secs = config.duration_secs,
        report_interval_secs = config.report_interval,
        "Starting bidirectional UDP QoS test"
    );
    println!(
        "{} {} for {}s",
        "qosprobe:".bold(),
        config.server,
        config.duration_secs
    );

    let summary = Orchestrator::from_config(&config)
        .run()
        .with_context(|| format!("QoS test against {} failed", config.server))?;

    let failed = summary
        .outcomes
        .iter()
        .filter(|(_, outcome)| matches!(outcome, StreamOutcome::LaunchFailed(_)))
        .count();
    if failed > 0 {
        warn!(failed_streams = failed, "Some streams could not be started");
    }

    info!(
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "QoS test complete"
    );
    Ok(())
}
