//! Message counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::router::RouteOutcome;

/// Lock-free counters updated by the forwarding handler
#[derive(Debug, Default)]
pub struct BridgeStats {
    received: AtomicU64,
    forwarded: AtomicU64,
    ignored: AtomicU64,
    unmatched: AtomicU64,
    dropped: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub ignored: u64,
    pub unmatched: u64,
    pub dropped: u64,
    pub send_failures: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} forwarded={} ignored={} unmatched={} dropped={} send_failures={}",
            self.received,
            self.forwarded,
            self.ignored,
            self.unmatched,
            self.dropped,
            self.send_failures
        )
    }
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a routing decision. Forwards are counted by [`Self::record_forwarded`]
    /// once the sink accepts them.
    pub fn record_outcome(&self, outcome: &RouteOutcome) {
        let counter = match outcome {
            RouteOutcome::Forward(_) => return,
            RouteOutcome::Ignored(_) => &self.ignored,
            RouteOutcome::Unmatched => &self.unmatched,
            RouteOutcome::Dropped(_) => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a record accepted by the sink; returns the new forwarded total
    pub fn record_forwarded(&self) -> u64 {
        self.forwarded.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    /// Log progress every `interval` forwarded records (0 disables)
    pub fn maybe_log_progress(&self, forwarded: u64, interval: u64) {
        if interval > 0 && forwarded % interval == 0 {
            info!("Progress: {}", self.snapshot());
        }
    }
}
