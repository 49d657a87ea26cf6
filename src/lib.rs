//! mqtt-fluent-bridge - Forward Tasmota MQTT telemetry to Fluent Bit
//!
//! Subscribes to an MQTT broker, turns smart-plug `SENSOR` and `STATE`
//! telemetry into `wattage` and `status` records, and ships them to a
//! Fluent Bit / Fluentd `forward` input.

pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod router;
pub mod sink;

#[cfg(test)]
mod test_support;

pub use bridge::{Bridge, BridgeError, BridgeState, BridgeStats};
pub use client::{ClientError, MessageHandler, MqttClient};
pub use config::Config;
pub use protocol::{ProtocolVersion, QoS};
pub use router::{RouteOutcome, Router, Tag};
pub use sink::{FluentSender, Sink, SinkError};
