//! Fluent Forward Sink Configuration

use std::time::Duration;

use serde::Deserialize;

use super::split_address;

/// Fluent Bit / Fluentd forward input settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FluentConfig {
    /// Collector address (host:port or just host)
    pub address: String,

    /// Prepended to every tag as `<prefix>.<tag>` when non-empty
    pub tag_prefix: String,

    /// TCP connect timeout (e.g., "5s")
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for FluentConfig {
    fn default() -> Self {
        Self {
            address: "fluentbit:24224".to_string(),
            tag_prefix: String::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl FluentConfig {
    /// Default forward input port
    pub const DEFAULT_PORT: u16 = 24224;

    /// Parse address into host and port
    pub fn parse_address(&self) -> (String, u16) {
        split_address(&self.address, Self::DEFAULT_PORT)
    }

    /// Full tag as sent on the wire
    pub fn full_tag(&self, tag: &str) -> String {
        if self.tag_prefix.is_empty() {
            tag.to_string()
        } else {
            format!("{}.{}", self.tag_prefix, tag)
        }
    }
}
