//! Broker Connection Configuration

use std::time::Duration;

use serde::Deserialize;

use super::split_address;
use crate::protocol::{ProtocolVersion, QoS};

/// MQTT protocol revision spoken to the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum MqttProtocol {
    #[default]
    #[serde(rename = "v3.1.1", alias = "v311", alias = "3.1.1")]
    V311,
    #[serde(rename = "v5", alias = "v5.0", alias = "5")]
    V5,
}

impl From<MqttProtocol> for ProtocolVersion {
    fn from(p: MqttProtocol) -> Self {
        match p {
            MqttProtocol::V311 => ProtocolVersion::V311,
            MqttProtocol::V5 => ProtocolVersion::V5,
        }
    }
}

/// Broker connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker address (host:port or just host)
    pub address: String,

    /// Client ID presented in CONNECT
    pub client_id: String,

    pub protocol: MqttProtocol,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Keep-alive interval in seconds (0 disables PINGREQ)
    pub keepalive: u16,

    /// Use clean start (no session persistence)
    pub clean_start: bool,

    /// Topic filter to subscribe to
    pub topic: String,

    /// Requested subscription QoS (0 or 1)
    pub qos: u8,

    /// TCP connect + CONNACK/SUBACK timeout (e.g., "10s")
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// How long DISCONNECT may take before the loop is aborted (e.g., "250ms")
    #[serde(with = "humantime_serde")]
    pub disconnect_grace: Duration,

    /// Largest inbound packet accepted, in bytes
    pub max_packet_size: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            address: "mqtt:1883".to_string(),
            client_id: "mqtt-fluent-bridge".to_string(),
            protocol: MqttProtocol::default(),
            username: None,
            password: None,
            keepalive: 60,
            clean_start: true,
            topic: "#".to_string(),
            qos: 0,
            connect_timeout: Duration::from_secs(10),
            disconnect_grace: Duration::from_millis(250),
            max_packet_size: 1024 * 1024,
        }
    }
}

impl MqttConfig {
    /// Default MQTT port over plain TCP
    pub const DEFAULT_PORT: u16 = 1883;

    /// Parse address into host and port
    pub fn parse_address(&self) -> (String, u16) {
        split_address(&self.address, Self::DEFAULT_PORT)
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol.into()
    }

    /// Requested QoS; anything above 1 is rejected by validation
    pub fn subscription_qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }
}
