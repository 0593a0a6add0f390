//! Configuration and artifact paths

use std::io;
use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "e2e-harness";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/e2e-harness/`
/// - macOS: `~/Library/Application Support/e2e-harness/`
/// - Windows: `%APPDATA%\e2e-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default directory for accessory log artifacts
pub fn default_artifact_dir() -> PathBuf {
    std::env::temp_dir().join("harness-artifacts")
}

/// Ensure the artifact directory exists
pub fn ensure_artifact_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
