//! Configuration loading from a TOML file with environment variable overrides.
//!
//! Looks for `rvc.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use serde::Deserialize;

use rvc_adapter_mqtt::MqttConfig;
use rvc_app::config::RvcConfig;
use rvc_domain::error::ValidationError;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub mqtt: MqttConfig,
    /// Bridge behaviour and the static coach tables.
    pub rvc: RvcConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rvcd=info,rvc_app=info,rvc_adapter_mqtt=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `rvc.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// result does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("rvc.toml")?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("RVC_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("RVC_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("RVC_TOPIC_PREFIX") {
            self.rvc.topic_prefix = val;
        }
        if let Some(val) = var("RVC_COMMAND_TOPIC") {
            self.rvc.command_topic = val;
        }
        if let Some(secs) = var("RVC_AVAILABILITY_TIMEOUT").and_then(|val| val.parse().ok()) {
            self.rvc.availability_timeout = secs;
        }
        if let Some(val) = var("RVC_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation("mqtt port must be non-zero".to_string()));
        }
        if self.mqtt.broker_host.trim().is_empty() {
            return Err(ConfigError::Validation("mqtt host must not be empty".to_string()));
        }
        self.rvc.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
    /// The coach tables do not validate.
    #[error("invalid bridge configuration")]
    Bridge(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.mqtt.broker_host, "localhost");
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.rvc.topic_prefix, "rvc");
        assert_eq!(config.logging.filter, "rvcd=info,rvc_app=info,rvc_adapter_mqtt=info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.rvc.availability_timeout, 300);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [mqtt]
            broker_host = '192.168.100.234'
            broker_port = 1884
            client_id = 'coach'

            [rvc]
            topic_prefix = 'bus'
            availability_timeout = 0
            command_format = 'structured'

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.broker_host, "192.168.100.234");
        assert_eq!(config.mqtt.broker_port, 1884);
        assert_eq!(config.mqtt.client_id, "coach");
        assert_eq!(config.rvc.topic_prefix, "bus");
        assert_eq!(config.rvc.availability_timeout, 0);
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_apply_environment_overrides() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[
            ("RVC_MQTT_HOST", "broker.lan"),
            ("RVC_MQTT_PORT", "8883"),
            ("RVC_TOPIC_PREFIX", "coach"),
            ("RVC_COMMAND_TOPIC", "bridge/cmd"),
            ("RVC_AVAILABILITY_TIMEOUT", "60"),
            ("RVC_LOG", "rvcd=debug"),
        ]));
        assert_eq!(config.mqtt.broker_host, "broker.lan");
        assert_eq!(config.mqtt.broker_port, 8883);
        assert_eq!(config.rvc.topic_prefix, "coach");
        assert_eq!(config.rvc.command_topic, "bridge/cmd");
        assert_eq!(config.rvc.availability_timeout, 60);
        assert_eq!(config.logging.filter, "rvcd=debug");
    }

    #[test]
    fn should_prefer_rust_log_over_rvc_log() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[("RVC_LOG", "info"), ("RUST_LOG", "trace")]));
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_ignore_unparsable_numeric_overrides() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[
            ("RVC_MQTT_PORT", "eighteen"),
            ("RVC_AVAILABILITY_TIMEOUT", "-1"),
        ]));
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.rvc.availability_timeout, 300);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.mqtt.broker_port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_invalid_bridge_tables() {
        let mut config = Config::default();
        config.rvc.topic_prefix = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Bridge(_))));
    }
}
