//! Runner configuration, read from a TOML file.
//!
//! ```toml
//! show = "shows/opening.json"
//! tick_hz = 30
//! max_ticks = 900
//! log_every = 30
//! log_filter = "info,showgraph_core=debug"
//! stdin_media_reports = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_TICK_HZ: f64 = 30.0;
pub const MAX_TICK_HZ: f64 = 1000.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Show document to load
    pub show: Option<PathBuf>,
    /// Evaluation rate
    pub tick_hz: f64,
    /// Stop after this many ticks; run until interrupted when unset
    pub max_ticks: Option<u64>,
    /// Write a tick log every N ticks (error changes are always logged)
    pub log_every: u64,
    /// Fallback tracing filter when `RUST_LOG` is not set
    pub log_filter: String,
    /// Read `finish <nodeId>` lines from stdin
    pub stdin_media_reports: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            show: None,
            tick_hz: DEFAULT_TICK_HZ,
            max_ticks: None,
            log_every: 30,
            log_filter: "info".to_string(),
            stdin_media_reports: true,
        }
    }
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        // Relative show paths are relative to the config file.
        if let (Some(show), Some(dir)) = (&config.show, path.parent()) {
            if show.is_relative() {
                config.show = Some(dir.join(show));
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz > 0.0 && self.tick_hz <= MAX_TICK_HZ) {
            return Err(ConfigError::Invalid(format!(
                "tick_hz must be in (0, {}], got {}",
                MAX_TICK_HZ, self.tick_hz
            )));
        }
        if self.log_every == 0 {
            return Err(ConfigError::Invalid("log_every must be at least 1".into()));
        }
        Ok(())
    }

    /// Seconds between ticks.
    pub fn tick_period(&self) -> f64 {
        1.0 / self.tick_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = RunnerConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.tick_hz, 30.0);
        assert!(config.stdin_media_reports);
    }

    #[test]
    fn test_full_file() {
        let config = RunnerConfig::from_toml_str(
            r#"
            show = "opening.json"
            tick_hz = 60
            max_ticks = 120
            log_every = 10
            log_filter = "debug"
            stdin_media_reports = false
            "#,
        )
        .unwrap();
        assert_eq!(config.show, Some(PathBuf::from("opening.json")));
        assert_eq!(config.tick_hz, 60.0);
        assert_eq!(config.max_ticks, Some(120));
        assert_eq!(config.log_every, 10);
        assert!(!config.stdin_media_reports);
        assert!((config.tick_period() - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RunnerConfig::from_toml_str("tick_hz = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunnerConfig::from_toml_str("log_every = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RunnerConfig::from_toml_str("tick_hz = \"fast\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
