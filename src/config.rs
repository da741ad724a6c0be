//! Configuration module for the Linky-MQTT bridge
//!
//! Loads configuration from a TOML file:
//! - [default] - General settings (log_level)
//! - [mqtt] - MQTT broker settings
//! - [statistics] - Long-term statistics store settings
//! - [[meters]] - One record per configured metering point, appended by `setup`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base URL of the Enedis data gateway
pub const DEFAULT_API_URL: &str = "https://conso.boris.sh";

/// Log level for the application
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing LevelFilter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LogLevel::Trace => "TRACE",
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Error => "ERROR",
            }
        )
    }
}

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub meters: Vec<MeterConfig>,
}

/// General application settings
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DefaultConfig {
    /// Log level: TRACE, DEBUG, INFO, WARN, ERROR
    #[serde(default)]
    pub log_level: LogLevel,
}

/// One configured metering point
#[derive(Deserialize, Serialize, Clone)]
pub struct MeterConfig {
    /// Bearer token issued by the Enedis data gateway (required)
    pub token: String,

    /// Metering point identifier, 14 digits (required)
    pub prm: String,

    /// Refresh interval (e.g., "6h")
    #[serde(default = "default_scan_interval", with = "humantime_serde")]
    pub scan_interval: Duration,

    /// Delay between two API calls within one refresh cycle.
    /// The gateway enforces a ceiling of 5 requests per second.
    #[serde(default = "default_request_delay", with = "humantime_serde")]
    pub request_delay: Duration,

    /// Base URL of the Enedis data gateway
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl MeterConfig {
    /// A meter record with default timings, as written by the setup flow
    pub fn new(token: impl Into<String>, prm: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            prm: prm.into(),
            scan_interval: default_scan_interval(),
            request_delay: default_request_delay(),
            api_url: default_api_url(),
        }
    }
}

fn default_scan_interval() -> Duration {
    Duration::from_secs(6 * 60 * 60)
}

fn default_request_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl std::fmt::Debug for MeterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MeterConfig")
            .field("token", &"***REDACTED***")
            .field("prm", &self.prm)
            .field("scan_interval", &self.scan_interval)
            .field("request_delay", &self.request_delay)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Statistics store configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatisticsConfig {
    /// Path of the SQLite database holding the cumulative statistics
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("linky-statistics.db")
}

/// MQTT broker configuration
#[derive(Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    /// MQTT root topic (e.g., "linky")
    #[serde(default = "default_mqtt_root")]
    pub root: String,

    /// MQTT broker hostname
    pub host: String,

    /// MQTT broker port (default 1883)
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT username (empty disables authentication)
    #[serde(default)]
    pub username: String,

    /// MQTT password
    #[serde(default)]
    pub password: String,
}

fn default_mqtt_root() -> String {
    "linky".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("root", &self.root)
            .finish()
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the config.toml file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Write the configuration back to disk, used by the setup flow after
    /// appending a meter record
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(path.as_ref(), contents).map_err(|e| ConfigError::WriteError(e.to_string()))
    }

    /// Validate configuration logic (semantic validation beyond type checks)
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "mqtt.host must not be empty".to_string(),
            ));
        }

        for (index, meter) in self.meters.iter().enumerate() {
            if meter.token.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "meters[{index}].token must not be empty"
                )));
            }
            if meter.prm.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "meters[{index}].prm must not be empty"
                )));
            }
            if self.meters[..index].iter().any(|m| m.prm == meter.prm) {
                return Err(ConfigError::ValidationError(format!(
                    "metering point {} is configured more than once",
                    meter.prm
                )));
            }
        }

        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    #[error("Failed to write configuration file: {0}")]
    WriteError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let default = DefaultConfig::default();
        assert_eq!(default.log_level, LogLevel::Info);
    }

    #[test]
    fn test_meter_defaults() {
        let toml_str = r#"
            [mqtt]
            host = "test"

            [[meters]]
            token = "header.payload.signature"
            prm = "12345678901234"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let meter = &config.meters[0];
        assert_eq!(meter.scan_interval, Duration::from_secs(6 * 60 * 60));
        assert_eq!(meter.request_delay, Duration::from_millis(200));
        assert_eq!(meter.api_url, DEFAULT_API_URL);
        assert_eq!(
            config.statistics.database,
            PathBuf::from("linky-statistics.db")
        );
    }

    #[test]
    fn test_log_level_parsing() {
        // Test that log levels are parsed correctly from TOML
        let toml_str = r#"
            [default]
            log_level = "DEBUG"

            [mqtt]
            host = "test"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_humantime_durations() {
        let toml_str = r#"
            [mqtt]
            host = "test"

            [[meters]]
            token = "t"
            prm = "1"
            scan_interval = "12h"
            request_delay = "500ms"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let meter = &config.meters[0];
        assert_eq!(meter.scan_interval, Duration::from_secs(12 * 60 * 60));
        assert_eq!(meter.request_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_duplicate_prm_rejected() {
        let toml_str = r#"
            [mqtt]
            host = "test"

            [[meters]]
            token = "t1"
            prm = "12345678901234"

            [[meters]]
            token = "t2"
            prm = "12345678901234"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("12345678901234"));
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config: Config = toml::from_str(
            r#"
            [mqtt]
            host = "broker.local"
            "#,
        )
        .unwrap();
        config.meters.push(MeterConfig::new("tok", "111"));
        config.save(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.meters.len(), 1);
        assert_eq!(reloaded.meters[0].prm, "111");
        assert_eq!(reloaded.meters[0].token, "tok");
    }
}
