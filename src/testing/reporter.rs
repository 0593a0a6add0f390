//! The test-reporting capability consumed by accessories and readiness probes

use futures_util::future::BoxFuture;
use tokio::time::Instant;

/// Teardown action registered with a [`Reporter`]
///
/// Hooks are asynchronous so they can wait for background work (such as an
/// accessory process exiting) without blocking a runtime thread.
pub type CleanupHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// What a test exposes to the harness
///
/// Implementations must be shareable across tasks: accessories report
/// failures from a background watcher long after `run` has returned.
pub trait Reporter: Send + Sync {
    /// Record an informational line
    fn log(&self, message: &str);

    /// Record a failure and mark the test as failed
    ///
    /// The message is taken verbatim; it is never used as a format string.
    fn error(&self, message: &str);

    /// Register a hook to run at teardown
    fn cleanup(&self, hook: CleanupHook);

    /// When the test will be forcibly stopped, if it has a deadline
    fn deadline(&self) -> Option<Instant>;

    /// Whether a failure has been recorded
    fn failed(&self) -> bool;
}
