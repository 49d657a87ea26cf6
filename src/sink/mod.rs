//! Record Sinks
//!
//! A sink receives tagged records from the forwarding handler. The bridge
//! owns exactly one sink for its whole lifetime: it is connected before the
//! broker, shared as `Arc<dyn Sink>`, and closed once at shutdown.

mod forward;

use std::fmt;

use async_trait::async_trait;

pub use forward::{encode_message, unix_time, FluentSender};

use crate::router::Record;

/// Error type for sink operations
#[derive(Debug)]
pub enum SinkError {
    /// Could not reach the collector
    Connect(String),
    /// Write to an established connection failed
    Io(std::io::Error),
    /// Record could not be serialized
    Encode(String),
    /// Sink was already closed
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Connect(msg) => write!(f, "Connect failed: {}", msg),
            SinkError::Io(e) => write!(f, "IO error: {}", e),
            SinkError::Encode(msg) => write!(f, "Encode error: {}", msg),
            SinkError::Closed => write!(f, "Sink closed"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<rmp_serde::encode::Error> for SinkError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SinkError::Encode(e.to_string())
    }
}

/// Destination for routed records
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one record under `tag`
    async fn emit(&self, tag: &str, record: &Record) -> Result<(), SinkError>;

    /// Release the connection. Later `emit` calls fail with [`SinkError::Closed`].
    async fn close(&self) -> Result<(), SinkError>;
}
