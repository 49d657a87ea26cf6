//! Bridge lifecycle states

use std::fmt;

/// Where the bridge is in its lifecycle
///
/// ```text
/// Starting ─► Connecting ─► Subscribed ─► Running ─► ShuttingDown ─► Stopped
///    │            │              │                        ▲
///    └────────────┴──────────────┴──── (failure) ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// Connecting the sink
    #[default]
    Starting,
    /// CONNECT sent, waiting for the broker
    Connecting,
    /// Subscription acknowledged
    Subscribed,
    /// Message loop delivering to the sink
    Running,
    /// Disconnecting from the broker and closing the sink
    ShuttingDown,
    /// Terminal
    Stopped,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Starting => "starting",
            BridgeState::Connecting => "connecting",
            BridgeState::Subscribed => "subscribed",
            BridgeState::Running => "running",
            BridgeState::ShuttingDown => "shutting down",
            BridgeState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
