//! Bridge Lifecycle
//!
//! Owns the sink and the broker session for one run of the bridge:
//! connect the sink, connect and subscribe to the broker, forward until
//! shutdown or connection loss, then disconnect and close the sink.
//!
//! Losing the broker while running ends [`Bridge::run`] with an error. There
//! is no reconnect; the process is expected to be restarted by its supervisor.

mod handler;
mod state;
mod stats;


use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

pub use handler::ForwardingHandler;
pub use state::BridgeState;
pub use stats::{BridgeStats, StatsSnapshot};

use crate::client::{ClientError, MqttClient};
use crate::config::Config;
use crate::router::Router;
use crate::sink::{FluentSender, Sink, SinkError};

/// Error type for a bridge run
#[derive(Debug)]
pub enum BridgeError {
    /// Sink could not be reached
    Sink(SinkError),
    /// Broker connection failed or was lost
    Client(ClientError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Sink(e) => write!(f, "Sink error: {}", e),
            BridgeError::Client(e) => write!(f, "Broker error: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Sink(e) => Some(e),
            BridgeError::Client(e) => Some(e),
        }
    }
}

impl From<SinkError> for BridgeError {
    fn from(e: SinkError) -> Self {
        BridgeError::Sink(e)
    }
}

impl From<ClientError> for BridgeError {
    fn from(e: ClientError) -> Self {
        BridgeError::Client(e)
    }
}

/// MQTT to Fluent bridge
pub struct Bridge {
    config: Config,
    router: Router,
    state: Arc<RwLock<BridgeState>>,
    stats: Arc<BridgeStats>,
}

impl Bridge {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            router: Router::new(),
            state: Arc::new(RwLock::new(BridgeState::Starting)),
            stats: Arc::new(BridgeStats::new()),
        }
    }

    /// Replace the default routing rules
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        *self.state.read()
    }

    pub fn stats(&self) -> Arc<BridgeStats> {
        self.stats.clone()
    }

    fn set_state(&self, next: BridgeState) {
        let prev = std::mem::replace(&mut *self.state.write(), next);
        if prev != next {
            info!("Bridge state: {} -> {}", prev, next);
        }
    }

    /// Connect the Fluent sink, then run until `shutdown` resolves or the broker is lost
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        self.set_state(BridgeState::Starting);

        let sink = match FluentSender::connect(self.config.fluent.clone()).await {
            Ok(sender) => Arc::new(sender),
            Err(e) => {
                self.set_state(BridgeState::Stopped);
                return Err(e.into());
            }
        };

        self.run_with_sink(sink, shutdown).await
    }

    /// Run against an already connected sink. The sink is closed before returning.
    pub async fn run_with_sink<F>(&self, sink: Arc<dyn Sink>, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        let result = self.run_session(sink.clone(), shutdown).await;

        self.set_state(BridgeState::ShuttingDown);
        if let Err(e) = sink.close().await {
            warn!("Failed to close sink: {}", e);
        }

        info!("Bridge stopped: {}", self.stats.snapshot());
        self.set_state(BridgeState::Stopped);
        result
    }

    async fn run_session<F>(&self, sink: Arc<dyn Sink>, shutdown: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let client = tokio::select! {
            result = self.connect_and_subscribe() => result?,
            _ = &mut shutdown => {
                info!("Shutdown requested during startup");
                return Ok(());
            }
        };

        let handler = Arc::new(ForwardingHandler::new(
            self.router.clone(),
            sink,
            self.stats.clone(),
            self.config.stats.progress_interval,
        ));
        let mut handle = client.spawn(handler);
        self.set_state(BridgeState::Running);

        let ended = tokio::select! {
            _ = &mut shutdown => None,
            result = handle.finished() => Some(result),
        };

        self.set_state(BridgeState::ShuttingDown);
        match ended {
            None => {
                info!("Shutdown requested, disconnecting from broker");
                if let Err(e) = handle.disconnect(self.config.mqtt.disconnect_grace).await {
                    warn!("Broker disconnect failed: {}", e);
                }
                Ok(())
            }
            Some(Ok(())) => {
                debug!("Message loop ended");
                Ok(())
            }
            Some(Err(e)) => Err(e.into()),
        }
    }

    async fn connect_and_subscribe(&self) -> Result<MqttClient, ClientError> {
        let mqtt = &self.config.mqtt;

        self.set_state(BridgeState::Connecting);
        info!(
            "Connecting to broker {} as '{}' ({})",
            mqtt.address,
            mqtt.client_id,
            mqtt.protocol_version()
        );
        let mut client = MqttClient::connect(mqtt).await?;

        client.subscribe(&mqtt.topic, mqtt.subscription_qos()).await?;
        self.set_state(BridgeState::Subscribed);

        Ok(client)
    }
}
