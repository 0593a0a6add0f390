//! In-process reporter
//!
//! Records everything it is told, mirrors it to tracing, and runs cleanup
//! hooks in reverse registration order when the test is torn down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::reporter::{CleanupHook, Reporter};

/// A [`Reporter`] backed by memory
pub struct Recorder {
    name: String,
    deadline: Option<Instant>,
    logs: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    cleanups: Mutex<Vec<CleanupHook>>,
    failed: AtomicBool,
}

impl Recorder {
    /// Create a recorder without a deadline
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deadline: None,
            logs: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            failed: AtomicBool::new(false),
        }
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Informational lines recorded so far
    pub fn logs(&self) -> Vec<String> {
        lock(&self.logs).clone()
    }

    /// Failure messages recorded so far
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    /// Number of registered hooks that have not run yet
    pub fn pending_cleanups(&self) -> usize {
        lock(&self.cleanups).len()
    }

    /// Run all cleanup hooks, last registered first
    ///
    /// Hooks registered while teardown is in progress run too.
    pub async fn teardown(&self) {
        loop {
            let hook = lock(&self.cleanups).pop();
            match hook {
                Some(hook) => hook().await,
                None => break,
            }
        }
    }
}

impl Reporter for Recorder {
    fn log(&self, message: &str) {
        tracing::info!(test = %self.name, "{}", message);
        lock(&self.logs).push(message.to_string());
    }

    fn error(&self, message: &str) {
        tracing::error!(test = %self.name, "{}", message);
        lock(&self.errors).push(message.to_string());
        self.failed.store(true, Ordering::SeqCst);
    }

    fn cleanup(&self, hook: CleanupHook) {
        lock(&self.cleanups).push(hook);
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

// Poisoning is ignored: every critical section is a single push or pop.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
