//! Fluent Forward protocol sender
//!
//! Writes each record as a Message Mode entry `[tag, time, record]`
//! serialized with MessagePack. The collector does not acknowledge
//! entries (no `chunk` option is sent), so a successful write is the only
//! delivery signal.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Sink, SinkError};
use crate::config::FluentConfig;
use crate::router::Record;

/// Encode one Message Mode entry
pub fn encode_message(tag: &str, time: u64, record: &Record) -> Result<Vec<u8>, SinkError> {
    Ok(rmp_serde::to_vec(&(tag, time, record))?)
}

/// Current time as whole seconds since the Unix epoch
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

enum Connection {
    Open(TcpStream),
    /// Last write failed; reconnect on next emit
    Broken,
    Closed,
}

/// Sink writing to a Fluent Bit / Fluentd `forward` input over TCP
pub struct FluentSender {
    config: FluentConfig,
    conn: Mutex<Connection>,
}

impl FluentSender {
    /// Connect to the collector. Fails if it cannot be reached within the timeout.
    pub async fn connect(config: FluentConfig) -> Result<Self, SinkError> {
        let stream = Self::open(&config).await?;
        info!("Connected to fluent collector at {}", config.address);

        Ok(Self {
            config,
            conn: Mutex::new(Connection::Open(stream)),
        })
    }

    async fn open(config: &FluentConfig) -> Result<TcpStream, SinkError> {
        let (host, port) = config.parse_address();
        let stream = timeout(
            config.connect_timeout,
            TcpStream::connect(format!("{}:{}", host, port)),
        )
        .await
        .map_err(|_| SinkError::Connect(format!("{}: timed out", config.address)))?
        .map_err(|e| SinkError::Connect(format!("{}: {}", config.address, e)))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on {}: {}", config.address, e);
        }
        Ok(stream)
    }

    pub fn config(&self) -> &FluentConfig {
        &self.config
    }
}

#[async_trait]
impl Sink for FluentSender {
    async fn emit(&self, tag: &str, record: &Record) -> Result<(), SinkError> {
        let message = encode_message(&self.config.full_tag(tag), unix_time(), record)?;

        let mut conn = self.conn.lock().await;
        if let Connection::Broken = *conn {
            debug!("Reconnecting to fluent collector at {}", self.config.address);
            *conn = Connection::Open(Self::open(&self.config).await?);
        }

        let stream = match &mut *conn {
            Connection::Open(stream) => stream,
            _ => return Err(SinkError::Closed),
        };

        if let Err(e) = stream.write_all(&message).await {
            warn!("Fluent connection lost: {}", e);
            *conn = Connection::Broken;
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        let mut conn = self.conn.lock().await;
        match std::mem::replace(&mut *conn, Connection::Closed) {
            Connection::Open(mut stream) => {
                debug!("Closing fluent connection");
                stream.shutdown().await?;
                Ok(())
            }
            Connection::Broken => Ok(()),
            Connection::Closed => Err(SinkError::Closed),
        }
    }
}
