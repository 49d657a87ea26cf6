//! Forwarding handler: router output into the sink

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{error, info};

use super::stats::BridgeStats;
use crate::client::MessageHandler;
use crate::router::{log_outcome, RouteOutcome, Router};
use crate::sink::Sink;

/// Routes each inbound message and emits the resulting record
pub struct ForwardingHandler {
    router: Router,
    sink: Arc<dyn Sink>,
    stats: Arc<BridgeStats>,
    progress_interval: u64,
}

impl ForwardingHandler {
    pub fn new(
        router: Router,
        sink: Arc<dyn Sink>,
        stats: Arc<BridgeStats>,
        progress_interval: u64,
    ) -> Self {
        Self {
            router,
            sink,
            stats,
            progress_interval,
        }
    }

    /// Route and forward one message. Sink failures are logged, never retried.
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        self.stats.record_received();

        let outcome = self.router.classify(topic, payload);
        log_outcome(topic, payload, &outcome);
        self.stats.record_outcome(&outcome);

        let routed = match outcome {
            RouteOutcome::Forward(routed) => routed,
            _ => return,
        };

        info!(
            "Sending record to sink - {} - {}: {:?}",
            routed.tag, topic, routed.record
        );

        match self.sink.emit(routed.tag.as_str(), &routed.record).await {
            Ok(()) => {
                let forwarded = self.stats.record_forwarded();
                self.stats
                    .maybe_log_progress(forwarded, self.progress_interval);
            }
            Err(e) => {
                self.stats.record_send_failure();
                error!("Failed to send {} record from {}: {}", routed.tag, topic, e);
            }
        }
    }
}

#[async_trait]
impl MessageHandler for ForwardingHandler {
    async fn on_message(&self, topic: &str, payload: Bytes) {
        self.handle(topic, &payload).await;
    }
}
