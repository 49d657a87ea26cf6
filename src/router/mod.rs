//! Message Router
//!
//! Turns an inbound `(topic, payload)` pair into at most one tagged record
//! for the sink. Routing is a pure function of its input: the router holds
//! only its rule lists and can be shared across tasks without locking.
//!
//! Evaluation order:
//! 1. Ignore rules (`*/sensors`, `*/LWT`, `*discovery*`) drop the message
//!    before the payload is looked at.
//! 2. The payload is decoded as a JSON object.
//! 3. Classification rules (`*SENSOR` → `wattage`, `*STATE` → `status`) are
//!    tried in order; the first matching rule builds the record or rejects
//!    the payload.

mod payload;
mod rules;
mod topic;


use std::fmt;

use serde_json::{Map, Value};
use tracing::{error, info, trace, warn};

pub use payload::{decode_payload, parse_power, passthrough, require_object, require_str, Payload};
pub use rules::{
    default_ignore_rules, default_rules, extract_status, extract_wattage, Extractor, IgnoreRule,
    Rule,
};
pub use topic::{topic_segment, TopicMatch};

/// Structured record forwarded to the sink
pub type Record = Map<String, Value>;

/// Semantic category of a forwarded record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Energy readings from `SENSOR` telemetry
    Wattage,
    /// Relay and Wi-Fi status from `STATE` telemetry
    Status,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Wattage => "wattage",
            Tag::Status => "status",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record ready for the sink
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub tag: Tag,
    pub record: Record,
}

/// Why a message on a routable topic produced no record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// Payload is not a UTF-8 JSON object
    InvalidJson(String),
    /// Required field absent
    MissingField(&'static str),
    /// Required field present with the wrong JSON type
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    /// `POWER` was neither `ON` nor `OFF`
    UnsupportedStatus(String),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::InvalidJson(e) => write!(f, "invalid JSON payload: {}", e),
            RouteError::MissingField(field) => write!(f, "missing {} field", field),
            RouteError::WrongType {
                field,
                expected,
                found,
            } => write!(f, "{} field is {}, expected {}", field, found, expected),
            RouteError::UnsupportedStatus(status) => write!(f, "unsupported status: {}", status),
        }
    }
}

impl std::error::Error for RouteError {}

/// Result of routing one message
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Forward this record
    Forward(Routed),
    /// Topic matched an ignore rule (rule name)
    Ignored(&'static str),
    /// Payload decoded but no classification rule matched the topic
    Unmatched,
    /// A rule matched but the payload was unusable
    Dropped(RouteError),
}

impl RouteOutcome {
    pub fn into_routed(self) -> Option<Routed> {
        match self {
            RouteOutcome::Forward(routed) => Some(routed),
            _ => None,
        }
    }
}

/// Ordered rule evaluation over inbound messages
#[derive(Debug, Clone)]
pub struct Router {
    ignore: Vec<IgnoreRule>,
    rules: Vec<Rule>,
}

impl Router {
    /// Router with the Tasmota ignore list and `SENSOR`/`STATE` rules
    pub fn new() -> Self {
        Self::with_rules(default_ignore_rules(), default_rules())
    }

    pub fn with_rules(ignore: Vec<IgnoreRule>, rules: Vec<Rule>) -> Self {
        Self { ignore, rules }
    }

    pub fn ignore_rules(&self) -> &[IgnoreRule] {
        &self.ignore
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify a message without logging
    pub fn classify(&self, topic: &str, raw: &[u8]) -> RouteOutcome {
        if let Some(rule) = self.ignore.iter().find(|r| r.matcher.matches(topic)) {
            return RouteOutcome::Ignored(rule.name);
        }

        let payload = match decode_payload(raw) {
            Ok(p) => p,
            Err(e) => return RouteOutcome::Dropped(e),
        };

        match self.rules.iter().find(|r| r.matcher.matches(topic)) {
            Some(rule) => match (rule.extract)(topic, &payload) {
                Ok(record) => RouteOutcome::Forward(Routed {
                    tag: rule.tag,
                    record,
                }),
                Err(e) => RouteOutcome::Dropped(e),
            },
            None => RouteOutcome::Unmatched,
        }
    }

    /// Classify a message, logging every drop, and return the record to forward
    pub fn route(&self, topic: &str, raw: &[u8]) -> Option<Routed> {
        let outcome = self.classify(topic, raw);
        log_outcome(topic, raw, &outcome);
        outcome.into_routed()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit the diagnostic for a routing decision
pub fn log_outcome(topic: &str, raw: &[u8], outcome: &RouteOutcome) {
    match outcome {
        RouteOutcome::Forward(_) => {}
        RouteOutcome::Ignored(rule) => {
            info!("Ignoring message - {} (rule '{}')", topic, rule);
        }
        RouteOutcome::Unmatched => {
            trace!("No routing rule for {}", topic);
        }
        RouteOutcome::Dropped(e @ RouteError::InvalidJson(_)) => {
            warn!(
                "Bad payload - {} - {}: {}",
                topic,
                String::from_utf8_lossy(raw),
                e
            );
        }
        RouteOutcome::Dropped(e @ RouteError::UnsupportedStatus(_)) => {
            error!("Failed to parse power status on {}: {}", topic, e);
        }
        RouteOutcome::Dropped(e) => {
            warn!(
                "Dropping message - {} - {}: {}",
                topic,
                String::from_utf8_lossy(raw),
                e
            );
        }
    }
}
