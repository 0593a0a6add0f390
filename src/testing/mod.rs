//! Test reporting
//!
//! Accessories and readiness probes never touch global test state. They are
//! handed a [`Reporter`] and use it to log, fail the test, and register
//! teardown work. [`Recorder`] is the in-process implementation used by the
//! CLI driver and by tests.

mod recorder;
mod reporter;

pub use recorder::Recorder;
pub use reporter::{CleanupHook, Reporter};
