use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use logtally_core::config::LogtallyConfig;
use logtally_daemon::cli::DaemonCli;
use logtally_daemon::logging::init_tracing;
use logtally_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet, so always print to stderr too
            eprintln!("logtally-daemon: {e:#}");
            tracing::error!(error = %format!("{e:#}"), "logtally-daemon failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> Result<()> {
    let mut config = LogtallyConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .context("invalid command-line override")?;

    if cli.validate {
        print_summary(&config);
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "logtally-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await?;
    Ok(())
}

fn print_summary(config: &LogtallyConfig) {
    println!("configuration OK");
    if config.metrics.enabled {
        println!(
            "metrics: http://{}:{}{}",
            config.metrics.listen_addr, config.metrics.port, config.metrics.endpoint
        );
    } else {
        println!("metrics: disabled");
    }
    println!("events: {}", config.events.len());
    for event in &config.events {
        println!(
            "  {} <- `{}` ({} patterns)",
            event.name,
            event.command_line(),
            event.patterns.len()
        );
    }
}
