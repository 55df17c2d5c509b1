//! Configuration for the group synchrony engine.

use crate::core::{EngineConfig, DEFAULT_CAPACITY, DEFAULT_THRESHOLD};
use crate::transport::SensorRegistry;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Known sensor ids (order is normalized by the registry)
    pub sensors: Vec<String>,

    /// Cluster threshold on normalized HR distance
    pub threshold: f64,

    /// Items retained per time-series buffer
    pub buffer_capacity: usize,

    /// Start buffers with placeholder samples
    pub prefill: bool,

    /// Path for exporting aggregate records
    pub export_path: PathBuf,

    /// Path for storing transparency stats
    pub data_path: PathBuf,

    /// IANA timezone used for human-readable output
    pub timezone: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-group-sync");

        Self {
            sensors: vec!["Blue".to_string(), "Green".to_string(), "Red".to_string()],
            threshold: DEFAULT_THRESHOLD,
            buffer_capacity: DEFAULT_CAPACITY,
            prefill: true,
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            timezone: "UTC".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-group-sync")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.is_empty() {
            return Err(ConfigError::ParseError(
                "at least one sensor must be configured".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ParseError(format!(
                "threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ParseError(
                "buffer_capacity must be positive".to_string(),
            ));
        }
        self.tz().map(|_| ())
    }

    /// Parsed display timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::ParseError(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn registry(&self) -> SensorRegistry {
        SensorRegistry::new(self.sensors.iter().map(String::as_str))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            threshold: self.threshold,
            buffer_capacity: self.buffer_capacity,
            prefill: self.prefill,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.threshold, 0.025);
        assert_eq!(config.buffer_capacity, 100);
        assert!(config.prefill);
        assert_eq!(config.registry().len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{"sensors":["Red","Blue"],"threshold":0.05}"#).unwrap();
        assert_eq!(config.threshold, 0.05);
        assert_eq!(config.buffer_capacity, 100);
        assert_eq!(config.registry().ids()[0].as_str(), "Blue");
        assert_eq!(config.engine_config().threshold, 0.05);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_json(r#"{"threshold":1.5}"#).is_err());
        assert!(Config::from_json(r#"{"sensors":[]}"#).is_err());
        assert!(Config::from_json(r#"{"buffer_capacity":0}"#).is_err());
        assert!(matches!(
            Config::from_json(r#"{"timezone":"Mars/Olympus"}"#),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_timezone_parsing() {
        let config = Config {
            timezone: "Europe/Berlin".to_string(),
            ..Config::default()
        };
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::Berlin);
    }
}
