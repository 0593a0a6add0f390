//! E2E harness - accessory processes and readiness polling for test suites
//!
//! An [`Accessory`] runs an auxiliary executable for the lifetime of a test,
//! and [`readiness::ready`] waits for a server's health endpoints. Both
//! report through an injected [`Reporter`].

pub mod accessory;
pub mod cli;
pub mod commands;
pub mod common;
pub mod readiness;
pub mod testing;

// Re-export commonly used types for tests
pub use accessory::{Accessory, AccessorySettings};
pub use common::{Error, Result};
pub use readiness::{ready, Probe, ReadinessSettings};
pub use testing::{Recorder, Reporter};
