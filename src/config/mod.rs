//! Configuration Module
//!
//! Provides TOML-based configuration with support for:
//! - Logging level
//! - Broker connection (address, client id, subscription)
//! - Fluent forward sink
//! - Progress statistics
//! - Environment variable overrides (MQTT_FLUENT__* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

pub use fluent::FluentConfig;
pub use mqtt::{MqttConfig, MqttProtocol};

mod fluent;
mod mqtt;


/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "MQTT_FLUENT";

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
        .map_err(|e| ConfigError::Validation(format!("env substitution pattern: {}", e)))?;
    Ok(re
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string())
}

/// Split `host:port`, falling back to `default_port` when no port is given
pub(crate) fn split_address(address: &str, default_port: u16) -> (String, u16) {
    if let Some((host, port_str)) = address.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return (host.to_string(), port);
        }
    }
    (address.to_string(), default_port)
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub mqtt: MqttConfig,
    pub fluent: FluentConfig,
    pub stats: StatsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Progress statistics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Log the counters every N forwarded records (0 = only at shutdown)
    pub progress_interval: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            progress_interval: 100,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MQTT_FLUENT__` prefix with double underscores for nesting:
    ///    - `MQTT_FLUENT__MQTT__ADDRESS=broker:1883` overrides `mqtt.address`
    ///    - `MQTT_FLUENT__FLUENT__TAG_PREFIX=plugs` overrides `fluent.tag_prefix`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let mut builder = config::Config::builder()
            .set_default("log.level", defaults.log.level)?
            .set_default("mqtt.address", defaults.mqtt.address)?
            .set_default("mqtt.client_id", defaults.mqtt.client_id)?
            .set_default("mqtt.protocol", "v3.1.1")?
            .set_default("mqtt.keepalive", defaults.mqtt.keepalive as i64)?
            .set_default("mqtt.clean_start", defaults.mqtt.clean_start)?
            .set_default("mqtt.topic", defaults.mqtt.topic)?
            .set_default("mqtt.qos", defaults.mqtt.qos as i64)?
            .set_default("mqtt.connect_timeout", "10s")?
            .set_default("mqtt.disconnect_grace", "250ms")?
            .set_default("mqtt.max_packet_size", defaults.mqtt.max_packet_size as i64)?
            .set_default("fluent.address", defaults.fluent.address)?
            .set_default("fluent.tag_prefix", defaults.fluent.tag_prefix)?
            .set_default("fluent.connect_timeout", "5s")?
            .set_default(
                "stats.progress_interval",
                defaults.stats.progress_interval as i64,
            )?;

        // Load from file with env var substitution
        let path = path.as_ref();
        if !path.as_os_str().is_empty() {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let substituted = substitute_env_vars(&content)?;
                    builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(
                        "Config file {} not found, using defaults and environment",
                        path.display()
                    );
                }
                Err(e) => return Err(ConfigError::Io(e)),
            }
        }

        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.address.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.address must not be empty".to_string(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.client_id must not be empty".to_string(),
            ));
        }
        if self.mqtt.topic.is_empty() {
            return Err(ConfigError::Validation(
                "mqtt.topic must not be empty".to_string(),
            ));
        }
        // QoS 2 would need PUBREC/PUBREL/PUBCOMP handling
        if self.mqtt.qos > 1 {
            return Err(ConfigError::Validation(
                "mqtt.qos must be 0 or 1".to_string(),
            ));
        }
        if self.mqtt.password.is_some() && self.mqtt.username.is_none() {
            return Err(ConfigError::Validation(
                "mqtt.password requires mqtt.username".to_string(),
            ));
        }
        if self.fluent.address.is_empty() {
            return Err(ConfigError::Validation(
                "fluent.address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
