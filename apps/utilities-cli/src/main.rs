#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::Parser;
use commands::Command;
use config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use utilities_http::FetchEngine;
use utilities_resources::Provider;

/// Utilities CLI - nanoid, HTTP fetch and file download resources
#[derive(Parser)]
#[command(name = "utilities-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (transport defaults, logging)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print effective configuration (JSON) and exit
    #[arg(long, global = true)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // defaults -> YAML (if provided) -> env (UTILITIES__*) -> CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_verbosity(cli.verbose);

    if cli.print_config {
        println!("{}", config.to_pretty_json()?);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        anyhow::bail!("no command given, see --help");
    };

    logging::init(&config.logging)?;

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            cancel_on_signal.cancel();
        }
    });

    let provider = Provider::new(
        env!("CARGO_PKG_VERSION"),
        FetchEngine::new(config.transport),
    );
    let report = command.run(&provider, &cancel).await?;
    Ok(report.emit())
}
