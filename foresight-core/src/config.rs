//! Configuration types for Foresight

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Correction sentinel used when rendering speculative output as text
pub const DEFAULT_CORRECTION_MARKER: &str = "<MISPREDICT>";

/// Main configuration for Foresight
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForesightConfig {
    /// Streaming speculation configuration
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Plan speculation configuration
    #[serde(default)]
    pub plan: PlanConfig,
}

/// Streaming speculation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Capacity of the fragment channels between tasks
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Text rendered for the correction sentinel
    #[serde(default = "default_correction_marker")]
    pub correction_marker: String,
}

fn default_channel_capacity() -> usize {
    32
}

fn default_correction_marker() -> String {
    DEFAULT_CORRECTION_MARKER.to_string()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            correction_marker: default_correction_marker(),
        }
    }
}

/// Plan speculation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Upper bound on eagerly executed steps, on top of the reversibility rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_window: Option<usize>,

    /// Applies slower than this are logged as warnings
    #[serde(default = "default_slow_step_threshold", with = "humantime_serde")]
    pub slow_step_threshold: Duration,
}

fn default_slow_step_threshold() -> Duration {
    Duration::from_secs(5)
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_window: None,
            slow_step_threshold: default_slow_step_threshold(),
        }
    }
}

/// Builder for ForesightConfig
pub struct ConfigBuilder {
    config: ForesightConfig,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ForesightConfig::default(),
        }
    }

    /// Set runner configuration
    pub fn runner(mut self, config: RunnerConfig) -> Self {
        self.config.runner = config;
        self
    }

    /// Set plan configuration
    pub fn plan(mut self, config: PlanConfig) -> Self {
        self.config.plan = config;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ForesightConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ForesightConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (foresight.toml)
    /// 3. Environment variable overrides (`FORESIGHT_RUNNER__CHANNEL_CAPACITY`, ...)
    /// 4. File at `FORESIGHT_CONFIG_PATH`, if set
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(ForesightConfig::default()))
            .merge(Toml::file("foresight.toml"))
            .merge(Env::prefixed("FORESIGHT_").split("__"));

        // Check for custom config path
        if let Ok(path) = std::env::var("FORESIGHT_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: ForesightConfig = figment.extract().map_err(|e| {
            crate::error::ForesightError::Configuration(format!(
                "Failed to load configuration: {}",
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: ForesightConfig =
            Figment::from(Serialized::defaults(ForesightConfig::default()))
                .merge(Toml::file(path.as_ref()))
                .extract()
                .map_err(|e| {
                    crate::error::ForesightError::Configuration(format!(
                        "Failed to load configuration file: {}",
                        e
                    ))
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::ForesightError;

        if self.runner.channel_capacity == 0 {
            return Err(ForesightError::Configuration(
                "runner.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.runner.correction_marker.is_empty() {
            return Err(ForesightError::Configuration(
                "runner.correction_marker must not be empty".to_string(),
            ));
        }
        if self.plan.max_window == Some(0) {
            return Err(ForesightError::Configuration(
                "plan.max_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ForesightConfig::default();
        assert_eq!(config.runner.channel_capacity, 32);
        assert_eq!(config.runner.correction_marker, "<MISPREDICT>");
        assert_eq!(config.plan.max_window, None);
        assert_eq!(config.plan.slow_step_threshold, Duration::from_secs(5));
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[runner]
correction_marker = "<<retry>>"

[plan]
max_window = 3
slow_step_threshold = "250ms"
"#
        )
        .unwrap();

        let config = ForesightConfig::from_file(file.path()).unwrap();
        assert_eq!(config.runner.correction_marker, "<<retry>>");
        assert_eq!(config.runner.channel_capacity, 32);
        assert_eq!(config.plan.max_window, Some(3));
        assert_eq!(config.plan.slow_step_threshold, Duration::from_millis(250));
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let config = ConfigBuilder::new()
            .plan(PlanConfig {
                max_window: Some(0),
                ..Default::default()
            })
            .build();
        tokio_test::assert_err!(config.validate());
    }

    #[test]
    fn test_validation_rejects_empty_marker() {
        let config = ConfigBuilder::new()
            .runner(RunnerConfig {
                correction_marker: String::new(),
                ..Default::default()
            })
            .build();
        assert!(config.validate().is_err());
    }
}
