//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::{config_path, default_artifact_dir};
use super::Result;
use crate::accessory::{self, AccessorySettings};
use crate::readiness::{self, ReadinessSettings};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Accessory process settings
    #[serde(default)]
    pub accessory: AccessoryConfig,

    /// Readiness polling settings
    #[serde(default)]
    pub readiness: ReadinessConfig,

    /// Artifact output settings
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Accessory timing in seconds
#[derive(Debug, Deserialize)]
pub struct AccessoryConfig {
    /// Stop the accessory this long before the test deadline
    #[serde(default = "default_deadline_margin")]
    pub deadline_margin_secs: u64,

    /// Time between SIGTERM and a forced kill
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            deadline_margin_secs: default_deadline_margin(),
            kill_grace_secs: default_kill_grace(),
        }
    }
}

fn default_deadline_margin() -> u64 {
    accessory::DEADLINE_MARGIN.as_secs()
}
fn default_kill_grace() -> u64 {
    accessory::KILL_GRACE.as_secs()
}

/// Readiness polling settings
#[derive(Debug, Deserialize)]
pub struct ReadinessConfig {
    /// Delay between probes of one endpoint
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long each endpoint gets to answer 200
    #[serde(default = "default_endpoint_timeout")]
    pub endpoint_timeout_secs: u64,

    /// Host the endpoints are served on (IPv6 literals without brackets)
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            endpoint_timeout_secs: default_endpoint_timeout(),
            host: default_host(),
        }
    }
}

fn default_poll_interval() -> u64 {
    readiness::POLL_INTERVAL.as_millis() as u64
}
fn default_endpoint_timeout() -> u64 {
    readiness::ENDPOINT_TIMEOUT.as_secs()
}
fn default_host() -> String {
    readiness::DEFAULT_HOST.to_string()
}

/// Artifact output settings
#[derive(Debug, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory accessory logs are written to
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.readiness.poll_interval_ms == 0 {
            return Err(super::Error::Config(
                "readiness.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.readiness.endpoint_timeout_secs == 0 {
            return Err(super::Error::Config(
                "readiness.endpoint_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.readiness.host.is_empty() {
            return Err(super::Error::Config("readiness.host must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn accessory_settings(&self) -> AccessorySettings {
        AccessorySettings {
            deadline_margin: Duration::from_secs(self.accessory.deadline_margin_secs),
            kill_grace: Duration::from_secs(self.accessory.kill_grace_secs),
        }
    }

    pub fn readiness_settings(&self) -> ReadinessSettings {
        ReadinessSettings {
            poll_interval: Duration::from_millis(self.readiness.poll_interval_ms),
            endpoint_timeout: Duration::from_secs(self.readiness.endpoint_timeout_secs),
            host: self.readiness.host.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = Config::default();
        let accessory = config.accessory_settings();
        assert_eq!(accessory.deadline_margin, Duration::from_secs(10));
        assert_eq!(accessory.kill_grace, Duration::from_secs(5));

        let readiness = config.readiness_settings();
        assert_eq!(readiness.poll_interval, Duration::from_millis(100));
        assert_eq!(readiness.endpoint_timeout, Duration::from_secs(30));
        assert_eq!(readiness.host, "::1");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
[readiness]
endpoint_timeout_secs = 2

[artifacts]
dir = "/var/tmp/e2e"
"#,
        )
        .unwrap();

        assert_eq!(config.readiness.endpoint_timeout_secs, 2);
        assert_eq!(config.readiness.poll_interval_ms, 100);
        assert_eq!(config.accessory.deadline_margin_secs, 10);
        assert_eq!(config.artifacts.dir, PathBuf::from("/var/tmp/e2e"));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::parse("[readiness\nhost = 1").unwrap_err();
        assert!(matches!(err, super::super::Error::ConfigParse(_)));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let err = Config::parse("[readiness]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, super::super::Error::Config(_)));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = Config::load_from(Path::new("/nonexistent/harness.toml")).unwrap_err();
        assert!(matches!(err, super::super::Error::FileRead { .. }));
    }
}
