//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run an accessory until interrupted or until it exits
    Run {
        /// Executable to run
        command: String,

        /// Arguments to pass to the command
        #[arg(last = true)]
        args: Vec<String>,

        /// Directory for the `<command>.log` artifact (default: from config)
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// After starting, wait for /healthz and /readyz on this port
        #[arg(long)]
        ready_port: Option<u16>,

        /// Treat this many seconds from now as the test deadline
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Wait for /healthz and /readyz on a port
    Ready {
        /// Port the server listens on
        port: u16,
    },
}
