//! Stopping accessory processes
//!
//! On Unix accessories lead their own process group, so signals reach any
//! helpers they started as well.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

/// Terminate a child and reap it
///
/// On Unix the process group first gets SIGTERM and `grace` to exit on its
/// own, then SIGKILL. Elsewhere the child is killed immediately.
pub async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        if signal(pid, libc::SIGTERM) {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(status) => {
                    kill_group(pid);
                    return status;
                }
                Err(_) => tracing::warn!(pid, ?grace, "process ignored SIGTERM; killing"),
            }
        }
        signal(pid, libc::SIGKILL);
    }

    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "kill after termination failed");
    }
    child.wait().await
}

/// Kill whatever is left in the process group led by `pgid`
///
/// Called once the leader has exited. Background helpers it left behind
/// still hold the output pipe open and would otherwise outlive the test.
#[cfg(unix)]
pub(crate) fn kill_group(pgid: u32) {
    if signal_group(pgid, libc::SIGKILL) {
        tracing::debug!(pgid, "killed processes left in the accessory group");
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pgid: u32) {}

/// Signal the process group led by `pid`, or just `pid` if it leads none
///
/// `pid` must be an unreaped child so it cannot have been recycled.
#[cfg(unix)]
fn signal(pid: u32, sig: libc::c_int) -> bool {
    // SAFETY: kill(2) has no memory-safety preconditions.
    signal_group(pid, sig) || unsafe { libc::kill(pid as libc::pid_t, sig) == 0 }
}

#[cfg(unix)]
fn signal_group(pgid: u32, sig: libc::c_int) -> bool {
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe { libc::kill(-(pgid as libc::pid_t), sig) == 0 }
}
