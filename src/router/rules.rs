//! Routing rules
//!
//! Two ordered lists: topics to ignore outright, and classification rules
//! that turn a payload into a tagged record. Both are evaluated first match
//! wins, in the order returned here.

use serde_json::Value;

use super::payload::{parse_power, passthrough, require_object, require_str, Payload};
use super::topic::{topic_segment, TopicMatch};
use super::{Record, RouteError, Tag};

/// Builds a record from a topic and its decoded payload
pub type Extractor = fn(&str, &Payload) -> Result<Record, RouteError>;

/// A topic pattern whose messages are never forwarded
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pub name: &'static str,
    pub matcher: TopicMatch,
}

/// A classification rule: topic pattern, output tag, and field mapping
#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub matcher: TopicMatch,
    pub tag: Tag,
    pub extract: Extractor,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Tasmota housekeeping topics
pub fn default_ignore_rules() -> Vec<IgnoreRule> {
    vec![
        IgnoreRule {
            name: "sensors",
            matcher: TopicMatch::Suffix("/sensors"),
        },
        IgnoreRule {
            name: "lwt",
            matcher: TopicMatch::Suffix("/LWT"),
        },
        IgnoreRule {
            name: "discovery",
            matcher: TopicMatch::Contains("discovery"),
        },
    ]
}

/// `SENSOR` telemetry then `STATE` status
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "sensor",
            matcher: TopicMatch::Suffix("SENSOR"),
            tag: Tag::Wattage,
            extract: extract_wattage,
        },
        Rule {
            name: "state",
            matcher: TopicMatch::Suffix("STATE"),
            tag: Tag::Status,
            extract: extract_status,
        },
    ]
}

fn base_record(topic: &str) -> Record {
    let mut record = Record::new();
    record.insert(
        "hardware_name".to_string(),
        Value::from(topic_segment(topic, 1)),
    );
    record.insert("source_topic".to_string(), Value::from(topic));
    record
}

/// `tele/<device>/SENSOR` energy readings
pub fn extract_wattage(topic: &str, payload: &Payload) -> Result<Record, RouteError> {
    let energy = require_object(payload, "ENERGY")?;

    let mut record = base_record(topic);
    record.insert("power".to_string(), passthrough(energy, "Power"));
    record.insert("voltage".to_string(), passthrough(energy, "Voltage"));
    record.insert("current".to_string(), passthrough(energy, "Current"));
    Ok(record)
}

/// `tele/<device>/STATE` relay and Wi-Fi status
pub fn extract_status(topic: &str, payload: &Payload) -> Result<Record, RouteError> {
    let wifi = require_object(payload, "Wifi")?;
    let power = parse_power(require_str(payload, "POWER")?)?;

    let mut record = base_record(topic);
    record.insert("wifi_name".to_string(), passthrough(wifi, "SSId"));
    record.insert("power".to_string(), Value::Bool(power));
    record.insert("uptime".to_string(), passthrough(payload, "UptimeSec"));
    record.insert("wifi_rssi".to_string(), passthrough(wifi, "RSSI"));
    record.insert("wifi_signal".to_string(), passthrough(wifi, "Signal"));
    Ok(record)
}
