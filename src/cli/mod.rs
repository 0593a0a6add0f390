//! CLI command handling
//!
//! Drives accessories and readiness probes under a [`Recorder`] and prints a
//! summary of what was recorded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::accessory::Accessory;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::readiness::Probe;
use crate::testing::{Recorder, Reporter};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Run {
            command,
            args,
            artifact_dir,
            ready_port,
            timeout,
        } => {
            let artifact_dir = artifact_dir.unwrap_or_else(|| config.artifacts.dir.clone());
            run_accessory(&config, command, args, artifact_dir, ready_port, timeout).await
        }

        Commands::Ready { port } => {
            let recorder = Recorder::new(format!("ready:{}", port));
            let probe = Probe::new(config.readiness_settings())?;
            let cancel = CancellationToken::new();

            tokio::select! {
                _ = probe.ready(&cancel, &recorder, port) => {}
                _ = tokio::signal::ctrl_c() => {
                    recorder.error("interrupted before the server became ready");
                }
            }

            finish(&recorder)
        }
    }
}

async fn run_accessory(
    config: &Config,
    command: String,
    args: Vec<String>,
    artifact_dir: PathBuf,
    ready_port: Option<u16>,
    timeout: Option<u64>,
) -> Result<()> {
    paths::ensure_artifact_dir(&artifact_dir)?;

    let mut recorder = Recorder::new(command.clone());
    if let Some(secs) = timeout {
        recorder = recorder.with_timeout(Duration::from_secs(secs));
    }
    let recorder = Arc::new(recorder);
    let reporter: Arc<dyn Reporter> = recorder.clone();

    let cancel = CancellationToken::new();
    let mut accessory = Accessory::new(reporter, &artifact_dir, &command, args)
        .with_settings(config.accessory_settings());

    if let Err(e) = accessory.run(&cancel).await {
        recorder.teardown().await;
        return Err(e);
    }
    println!(
        "{} `{}` (log: {})",
        "Started".green().bold(),
        command,
        accessory.log_path().display()
    );

    if let Some(port) = ready_port {
        match Probe::new(config.readiness_settings()) {
            Ok(probe) => {
                if probe.ready(&cancel, recorder.as_ref(), port).await {
                    println!("{} port {}", "Ready".green().bold(), port);
                }
            }
            Err(e) => recorder.error(&e.to_string()),
        }
    }

    if !recorder.failed() {
        tokio::select! {
            interrupted = tokio::signal::ctrl_c() => {
                if let Err(e) = interrupted {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                }
                println!("{} stopping `{}`", "Interrupted:".yellow(), command);
            }
            () = accessory.wait() => {}
        }
    }

    recorder.teardown().await;
    finish(&recorder)
}

/// Print what the recorder collected and turn failures into an error
fn finish(recorder: &Recorder) -> Result<()> {
    let errors = recorder.errors();
    for error in &errors {
        println!("  {} {}", "✗".red(), error);
    }

    if errors.is_empty() {
        println!("{} {}", "PASSED".green().bold(), recorder.name());
        Ok(())
    } else {
        println!("{} {}", "FAILED".red().bold(), recorder.name());
        Err(Error::Failed {
            name: recorder.name().to_string(),
            failures: errors.len(),
        })
    }
}
