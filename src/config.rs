//! Configuration for `liquid_sketch`.
//!
//! Configuration is parsed from TOML, with every field optional, and may be
//! overridden by environment variables:
//! - `LIQUID_SKETCH_ACK_TIMEOUT_MS` overrides `remote.ack_timeout_ms`
//! - `LIQUID_SKETCH_MAILBOX_CAPACITY` overrides `remote.mailbox_capacity`
use crate::error::SketchError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    pub remote: RemoteConfig,
}

/// Configuration of the dispatch to remote `DataSet`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// How long a `RemoteDataSet` waits for its request to be acknowledged
    pub ack_timeout_ms: u64,
    /// How many requests a peer or coordinator buffers before senders wait
    pub mailbox_capacity: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            ack_timeout_ms: 1000,
            mailbox_capacity: 64,
        }
    }
}

impl RemoteConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl FromStr for SketchConfig {
    type Err = SketchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| {
            SketchError::Config(format!("failed to parse TOML config: {}", e))
        })
    }
}

impl SketchConfig {
    /// Loads and validates the configuration in the TOML file at `path`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SketchError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SketchError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies the environment variable overrides. Values that do not parse
    /// are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LIQUID_SKETCH_ACK_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.remote.ack_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("LIQUID_SKETCH_MAILBOX_CAPACITY") {
            if let Ok(v) = val.parse() {
                self.remote.mailbox_capacity = v;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), SketchError> {
        if self.remote.ack_timeout_ms == 0 {
            return Err(SketchError::Config(
                "remote.ack_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.remote.mailbox_capacity == 0 {
            return Err(SketchError::Config(
                "remote.mailbox_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SketchConfig::default();
        assert_eq!(config.remote.ack_timeout(), Duration::from_secs(1));
        assert_eq!(config.remote.mailbox_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_empty() {
        let config: SketchConfig = "".parse().unwrap();
        assert_eq!(config, SketchConfig::default());
    }

    #[test]
    fn test_from_str_partial() {
        let toml = r#"
            [remote]
            ack_timeout_ms = 250
        "#;
        let config: SketchConfig = toml.parse().unwrap();
        assert_eq!(config.remote.ack_timeout_ms, 250);
        assert_eq!(config.remote.mailbox_capacity, 64);
    }

    #[test]
    fn test_from_str_invalid() {
        let res: Result<SketchConfig, _> = "[remote\nack".parse();
        assert!(matches!(res, Err(SketchError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[remote]\nack_timeout_ms = 20\nmailbox_capacity = 2")
            .unwrap();
        let config = SketchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.remote.ack_timeout(), Duration::from_millis(20));
        assert_eq!(config.remote.mailbox_capacity, 2);
    }

    #[test]
    fn test_from_file_rejects_zero_timeout() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[remote]\nack_timeout_ms = 0").unwrap();
        assert!(matches!(
            SketchConfig::from_file(file.path()),
            Err(SketchError::Config(_))
        ));
    }

    #[test]
    fn test_from_missing_file() {
        let res = SketchConfig::from_file("/nonexistent/liquid_sketch.toml");
        assert!(matches!(res, Err(SketchError::Config(_))));
    }
}
