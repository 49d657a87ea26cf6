//! MQTT Client
//!
//! Minimal subscriber: connects to one broker, subscribes to one filter, and
//! hands every PUBLISH to a [`MessageHandler`] from a background task.
//!
//! ```text
//! MqttClient::connect ─► subscribe ─► spawn(handler) ─► ClientHandle
//!                                                         ├─ finished()
//!                                                         └─ disconnect(grace)
//! ```

mod session;


use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use session::MqttClient;

use crate::protocol::{DecodeError, EncodeError, ProtocolError, ReasonCode};

/// Error type for broker communication
#[derive(Debug)]
pub enum ClientError {
    /// Connection to the broker failed or was lost
    ConnectionLost(String),
    /// Broker refused the CONNECT
    Rejected(ReasonCode),
    /// Broker refused the SUBSCRIBE
    SubscribeRejected(ReasonCode),
    /// Broker closed the session with a DISCONNECT
    ServerDisconnect(ReasonCode),
    /// Operation timed out
    Timeout,
    /// Malformed or unexpected packet
    Protocol(ProtocolError),
    /// Message loop task panicked or was cancelled
    Task(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            ClientError::Rejected(code) => write!(f, "CONNECT rejected: {}", code),
            ClientError::SubscribeRejected(code) => write!(f, "SUBSCRIBE rejected: {}", code),
            ClientError::ServerDisconnect(code) => write!(f, "Server sent DISCONNECT: {}", code),
            ClientError::Timeout => write!(f, "Operation timed out"),
            ClientError::Protocol(e) => write!(f, "Protocol error: {}", e),
            ClientError::Task(msg) => write!(f, "Client task failed: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Protocol(e.into())
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Protocol(e.into())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::ConnectionLost(e.to_string())
    }
}

/// Receives every application message delivered by the broker
///
/// Calls are sequential: the next PUBLISH is not read until the previous
/// call returns.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn on_message(&self, topic: &str, payload: Bytes);
}

/// Commands accepted by the message loop
#[derive(Debug)]
pub(crate) enum ClientCommand {
    /// Send DISCONNECT and stop
    Disconnect,
}

/// Handle to a running message loop
pub struct ClientHandle {
    command_tx: mpsc::Sender<ClientCommand>,
    task: JoinHandle<Result<(), ClientError>>,
}

impl ClientHandle {
    pub(crate) fn new(
        command_tx: mpsc::Sender<ClientCommand>,
        task: JoinHandle<Result<(), ClientError>>,
    ) -> Self {
        Self { command_tx, task }
    }

    /// Wait for the loop to end on its own (connection lost or closed by the server).
    ///
    /// Once this returns the handle must be dropped, not disconnected.
    pub async fn finished(&mut self) -> Result<(), ClientError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => Err(ClientError::Task(e.to_string())),
        }
    }

    /// Ask the loop to send DISCONNECT, waiting at most `grace` before aborting it
    pub async fn disconnect(mut self, grace: Duration) -> Result<(), ClientError> {
        if self.command_tx.try_send(ClientCommand::Disconnect).is_err() {
            debug!("Message loop already stopped");
        }

        match timeout(grace, &mut self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ClientError::Task(e.to_string())),
            Err(_) => {
                warn!("Message loop did not stop within {:?}, aborting", grace);
                self.task.abort();
                Ok(())
            }
        }
    }
}
