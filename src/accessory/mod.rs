//! Accessory processes
//!
//! An accessory is an auxiliary executable (a dependency service, a fake
//! backend) that runs for the lifetime of a test. Its stdout and stderr are
//! captured in memory and written to `<artifact dir>/<command>.log`.
//!
//! Stopping is split in two signals: the run token says "stop now", and a
//! one-shot completion channel says "it has stopped". The cleanup hook fires
//! the first and waits on the second, so teardown never returns while the
//! process is still alive or its output is still being written.

pub mod process;
pub mod tee;

use std::fs::File;
use std::io::{PipeReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result};
use crate::testing::Reporter;

pub use tee::{Capture, Tee};

/// How long before the test deadline an accessory is stopped
pub const DEADLINE_MARGIN: Duration = Duration::from_secs(10);

/// Time a process gets to exit after SIGTERM before it is killed
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// How long to wait for the output pipe to close once the process exited
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 8 * 1024;

/// Timing knobs for an accessory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorySettings {
    pub deadline_margin: Duration,
    pub kill_grace: Duration,
}

impl Default for AccessorySettings {
    fn default() -> Self {
        Self {
            deadline_margin: DEADLINE_MARGIN,
            kill_grace: KILL_GRACE,
        }
    }
}

/// Runs an executable with arguments for the duration of a test
pub struct Accessory {
    reporter: Arc<dyn Reporter>,
    artifact_dir: PathBuf,
    command: String,
    args: Vec<String>,
    settings: AccessorySettings,
    /// Set once the process has been started
    token: Option<CancellationToken>,
    /// Cancelled by the watcher once the process has exited
    exited: CancellationToken,
}

impl Accessory {
    /// Describe an accessory; nothing is started until [`Accessory::run`]
    pub fn new<I, S>(
        reporter: Arc<dyn Reporter>,
        artifact_dir: impl Into<PathBuf>,
        command: impl Into<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reporter,
            artifact_dir: artifact_dir.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            settings: AccessorySettings::default(),
            token: None,
            exited: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: AccessorySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Where the combined output is written
    ///
    /// Named after the last path component of the command, so `/usr/bin/etcd`
    /// logs to `etcd.log`.
    pub fn log_path(&self) -> PathBuf {
        let name = Path::new(&self.command)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.command.clone());
        self.artifact_dir.join(format!("{}.log", name))
    }

    /// Stop the process early; this is not reported as a failure
    pub fn stop(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    /// Resolves once a started process has exited and its output is drained
    ///
    /// Never resolves if [`Accessory::run`] did not start a process.
    pub async fn wait(&self) {
        self.exited.cancelled().await;
    }

    fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Start the process under a child of `parent`
    ///
    /// Returns as soon as the process is started. The process is stopped when
    /// `parent` is cancelled, when the test deadline minus the margin is
    /// reached, or at teardown. An unexpected exit is reported through the
    /// reporter, never through this return value.
    pub async fn run(&mut self, parent: &CancellationToken) -> Result<()> {
        if self.token.is_some() {
            return Err(Error::AlreadyRunning(self.command.clone()));
        }

        let token = parent.child_token();

        // Dropping `done_tx` on any early return below releases the hook.
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let reporter = Arc::downgrade(&self.reporter);
        let command = self.command.clone();
        let hook_token = token.clone();
        self.reporter.cleanup(Box::new(move || {
            async move {
                if let Some(reporter) = reporter.upgrade() {
                    reporter.log(&format!("cleanup: ending `{}`", command));
                }
                hook_token.cancel();
                let _ = done_rx.await;
            }
            .boxed()
        }));

        self.reporter.log(&format!("running: {}", self.command_line()));

        let log_path = self.log_path();
        let log_file = File::create(&log_path).map_err(|source| Error::LogFile {
            path: log_path.clone(),
            source,
        })?;

        // One pipe for both streams keeps them interleaved in write order.
        let (reader, writer) = std::io::pipe()?;
        let stderr = writer.try_clone()?;
        let child = {
            let mut cmd = Command::new(&self.command);
            cmd.args(&self.args)
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr)
                .kill_on_drop(true);
            #[cfg(unix)]
            cmd.process_group(0);
            cmd.spawn().map_err(|e| Error::spawn(&self.command, e))?
        };
        tracing::debug!(
            command = %self.command,
            pid = ?child.id(),
            log = %log_path.display(),
            "accessory started"
        );

        let tee = Tee::new().with_sink(log_path.display().to_string(), log_file);
        let capture = tee.capture();
        let drain = tokio::task::spawn_blocking(move || drain_output(reader, tee));

        if let Some(deadline) = self.reporter.deadline() {
            let stop_at = deadline
                .checked_sub(self.settings.deadline_margin)
                .unwrap_or_else(Instant::now);
            tokio::spawn(cancel_at(token.clone(), stop_at));
        }

        self.token = Some(token.clone());
        tokio::spawn(watch(Watch {
            reporter: self.reporter.clone(),
            command: self.command.clone(),
            child,
            drain,
            capture,
            token,
            kill_grace: self.settings.kill_grace,
            exited: self.exited.clone(),
            done: done_tx,
        }));

        Ok(())
    }
}

/// Cancel `token` at `at` unless it is cancelled first
async fn cancel_at(token: CancellationToken, at: Instant) {
    tokio::select! {
        () = tokio::time::sleep_until(at) => {
            tracing::debug!("test deadline margin reached; stopping accessory");
            token.cancel();
        }
        () = token.cancelled() => {}
    }
}

/// Copy the output pipe into the tee until every writer has closed it
fn drain_output(mut reader: PipeReader, mut tee: Tee) -> Tee {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let _ = tee.write_all(&buf[..n]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "reading accessory output failed");
                break;
            }
        }
    }
    tee
}

/// State owned by the completion watcher
struct Watch {
    reporter: Arc<dyn Reporter>,
    command: String,
    child: Child,
    drain: JoinHandle<Tee>,
    /// Read directly when the drain does not finish in time
    capture: Capture,
    token: CancellationToken,
    kill_grace: Duration,
    exited: CancellationToken,
    done: oneshot::Sender<()>,
}

/// Wait for the process to exit, report a crash, then signal completion
async fn watch(mut w: Watch) {
    let pid = w.child.id();
    let status = tokio::select! {
        status = w.child.wait() => status,
        () = w.token.cancelled() => process::terminate(&mut w.child, w.kill_grace).await,
    };
    let stopped_by_caller = w.token.is_cancelled();
    // Helpers left in the group keep the output pipe open.
    if let Some(pid) = pid {
        process::kill_group(pid);
    }

    let output = match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, w.drain).await {
        Ok(Ok(tee)) => tee.into_captured(),
        Ok(Err(e)) => {
            tracing::warn!(command = %w.command, error = %e, "output drain task failed");
            w.capture.snapshot()
        }
        Err(_) => {
            tracing::warn!(command = %w.command, "output pipe still open after exit");
            w.capture.snapshot()
        }
    };
    let output = String::from_utf8_lossy(&output);

    match exit_failure(status) {
        Some(failure) if !stopped_by_caller => {
            w.reporter
                .error(&format!("`{}` failed: {} output: {}", w.command, failure, output));
        }
        Some(failure) => {
            tracing::debug!(command = %w.command, %failure, "accessory stopped");
        }
        None => {
            tracing::debug!(command = %w.command, "accessory exited cleanly");
        }
    }

    w.exited.cancel();
    let _ = w.done.send(());
}

/// Describe why an exit counts as a failure, if it does
fn exit_failure(status: std::io::Result<ExitStatus>) -> Option<String> {
    match status {
        Ok(status) if status.success() => None,
        Ok(status) => Some(status.to_string()),
        Err(e) => Some(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    fn accessory(command: &str) -> Accessory {
        let reporter: Arc<dyn Reporter> = Arc::new(Recorder::new("unit"));
        Accessory::new(reporter, "/tmp/artifacts", command, ["--port", "8080"])
    }

    #[test]
    fn test_log_path_uses_command_file_name() {
        assert_eq!(
            accessory("etcd").log_path(),
            PathBuf::from("/tmp/artifacts/etcd.log")
        );
        assert_eq!(
            accessory("/usr/local/bin/etcd").log_path(),
            PathBuf::from("/tmp/artifacts/etcd.log")
        );
    }

    #[test]
    fn test_command_line() {
        let a = accessory("etcd");
        assert_eq!(a.command_line(), "etcd --port 8080");
        assert_eq!(a.args(), ["--port", "8080"]);
    }

    #[test]
    fn test_default_settings() {
        let a = accessory("etcd");
        assert_eq!(a.settings.deadline_margin, Duration::from_secs(10));
        assert_eq!(a.settings.kill_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_stop_before_run_is_noop() {
        accessory("etcd").stop();
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_failure() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_failure(Ok(ExitStatus::from_raw(0))), None);
        assert!(exit_failure(Ok(ExitStatus::from_raw(1 << 8)))
            .unwrap()
            .contains('1'));
        assert!(exit_failure(Err(std::io::Error::other("wait failed"))).is_some());
    }

    #[tokio::test]
    async fn test_deadline_task_cancels() {
        let token = CancellationToken::new();
        cancel_at(token.clone(), Instant::now() + Duration::from_millis(20)).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_task_exits_on_cancel() {
        let token = CancellationToken::new();
        let task = tokio::spawn(cancel_at(token.clone(), Instant::now() + Duration::from_secs(3600)));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
