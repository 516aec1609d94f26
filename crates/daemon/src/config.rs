//! Daemon configuration.
//!
//! Layered: TOML file, then environment overrides.
//!
//! ```toml
//! name = "run-retry-daemon"
//! poll_interval_ms = 1000
//! batch_size = 100
//!
//! [run_retries]
//! enabled = true
//! max_retries = 3
//! retry_on_asset_or_op_failure = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use assetflow_runs::RunRetriesConfig;

pub const ENV_RUN_RETRIES_ENABLED: &str = "ASSETFLOW_RUN_RETRIES_ENABLED";
pub const ENV_RUN_RETRIES_MAX_RETRIES: &str = "ASSETFLOW_RUN_RETRIES_MAX_RETRIES";
pub const ENV_POLL_INTERVAL_MS: &str = "ASSETFLOW_POLL_INTERVAL_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Retry daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Name for logging and the worker thread
    pub name: String,
    pub poll_interval_ms: u64,
    /// Max failure events read per iteration
    pub batch_size: usize,
    pub run_retries: RunRetriesConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: "run-retry-daemon".to_string(),
            poll_interval_ms: 1000,
            batch_size: 100,
            run_retries: RunRetriesConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `ASSETFLOW_*` overrides from the process environment.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_RUN_RETRIES_ENABLED) {
            self.run_retries.enabled = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                other => {
                    return Err(ConfigError::invalid(
                        ENV_RUN_RETRIES_ENABLED,
                        format!("expected a boolean, got '{other}'"),
                    ));
                }
            };
        }
        if let Some(raw) = lookup(ENV_RUN_RETRIES_MAX_RETRIES) {
            self.run_retries.max_retries = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(ENV_RUN_RETRIES_MAX_RETRIES, format!("'{raw}' is not a count"))
            })?;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(ENV_POLL_INTERVAL_MS, format!("'{raw}' is not a duration"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be positive"));
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_run_retries(mut self, run_retries: RunRetriesConfig) -> Self {
        self.run_retries = run_retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert!(!config.run_retries.enabled);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn parses_partial_sections() {
        let config = DaemonConfig::from_toml_str(
            r#"
            batch_size = 10

            [run_retries]
            enabled = true
            max_retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.name, "run-retry-daemon");
        assert!(config.run_retries.enabled);
        assert_eq!(config.run_retries.max_retries, 3);
        assert!(config.run_retries.retry_on_asset_or_op_failure);
    }

    #[test]
    fn rejects_zero_batch() {
        assert!(matches!(
            DaemonConfig::from_toml_str("batch_size = 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            DaemonConfig::from_toml_str("batch_size = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"retries\"\npoll_interval_ms = 250").unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "retries");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DaemonConfig::load(dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn env_overrides_take_precedence() {
        let vars = HashMap::from([
            (ENV_RUN_RETRIES_ENABLED, "true"),
            (ENV_RUN_RETRIES_MAX_RETRIES, "5"),
            (ENV_POLL_INTERVAL_MS, "50"),
        ]);
        let config = DaemonConfig::default()
            .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert!(config.run_retries.enabled);
        assert_eq!(config.run_retries.max_retries, 5);
        assert_eq!(config.poll_interval_ms, 50);
    }

    #[test]
    fn malformed_env_override_is_rejected() {
        let result = DaemonConfig::default().apply_overrides_from(|key| {
            (key == ENV_RUN_RETRIES_MAX_RETRIES).then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid { key, .. }) if key == ENV_RUN_RETRIES_MAX_RETRIES));
    }
}
