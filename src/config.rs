//! Configuration file parsing.
//!
//! Reads optional `minidb.toml` files. Command-line flags override any value
//! set here; a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Root directory for catalog metadata and table data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// TCP port the server listens on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level: "off", "error", "warn", "info", "debug", "trace".
    /// The MINIDB_LOG environment variable takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file; stderr is always written
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some(PathBuf::from("minidb.log")),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_port() -> u16 {
    9876
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.log.level.parse::<log::LevelFilter>().is_err() {
            return Err(ConfigError::Validation(format!(
                "invalid log level '{}'. Valid values: off, error, warn, info, debug, trace",
                self.log.level
            )));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: parse TOML into Config and run validation.
    fn parse_and_validate(toml_str: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 9876);
        assert_eq!(config.server.data_dir, PathBuf::from("./data"));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = parse_and_validate("[server]\nport = 4000").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_valid_log_levels() {
        for level in &["off", "error", "warn", "info", "debug", "trace"] {
            let toml = format!("[log]\nlevel = \"{}\"", level);
            assert!(
                parse_and_validate(&toml).is_ok(),
                "level = '{}' should be valid",
                level
            );
        }
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let err = parse_and_validate("[log]\nlevel = \"loud\"").unwrap_err();
        assert!(
            err.to_string().contains("invalid log level"),
            "Expected validation error, got: {}",
            err
        );
    }

    #[test]
    fn test_zero_port_rejected() {
        let err = parse_and_validate("[server]\nport = 0").unwrap_err();
        assert!(err.to_string().contains("non-zero"));
    }
}
