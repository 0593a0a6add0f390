//! E2E harness CLI
//!
//! Runs an accessory process for manual end-to-end testing and waits for
//! servers to report healthy and ready.

use std::path::PathBuf;

use clap::Parser;
use harness::cli;
use harness::commands::Commands;
use harness::common::config::Config;
use harness::common::logging;

#[derive(Parser)]
#[command(name = "harness", about = "Accessory processes and readiness checks for e2e tests")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
