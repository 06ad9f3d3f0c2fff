//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Signals**: Latest-value state published through `watch` channels
//! 3. **Ownership**: Values are moved into the store; senders keep nothing

use tokio::sync::oneshot;

use crate::{
    state::{AlertEntry, MetricPoint, StoreSnapshot, StoreStats},
    types::{ServerInfo, ServiceInfo},
};

/// Commands that can be sent to the StoreActor
///
/// Every command is applied to completion before the next one is read, which
/// is what makes each store operation atomic with respect to readers.
#[derive(Debug)]
pub enum StoreCommand {
    SetConnected(bool),

    SetServers(Vec<ServerInfo>),

    SetServices(Vec<ServiceInfo>),

    AddMetricPoint { entity_id: String, point: MetricPoint },

    SetMetricsHistory {
        entity_id: String,
        points: Vec<MetricPoint>,
    },

    /// Merge older points in front of the live history
    PrependMetricsHistory {
        entity_id: String,
        points: Vec<MetricPoint>,
    },

    ClearMetricsHistory { entity_id: String },

    AddAlert(AlertEntry),

    SetTimeWindow { seconds: u64 },

    /// Copy of the full state
    Snapshot {
        respond_to: oneshot::Sender<StoreSnapshot>,
    },

    /// History of a single entity, oldest first
    MetricsHistory {
        entity_id: String,
        respond_to: oneshot::Sender<Vec<MetricPoint>>,
    },

    /// Alert log, newest first
    Alerts {
        respond_to: oneshot::Sender<Vec<AlertEntry>>,
    },

    GetStats {
        respond_to: oneshot::Sender<StoreStats>,
    },

    /// Gracefully shut down the store actor
    Shutdown,
}

/// Observable state of the streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// A connection attempt is in flight
    Connecting,

    /// Stream is open
    Connected,

    /// No connection. A retry may be scheduled.
    #[default]
    Disconnected,

    /// Retries are used up; only a manual connect resumes
    Exhausted,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Commands that can be sent to the TransportActor
#[derive(Debug)]
pub enum TransportCommand {
    /// Open the stream unless one is open or opening
    Connect,

    /// Cancel pending retries and close the stream
    Disconnect,

    /// Reconnect attempts since the last successful open
    GetAttempts { respond_to: oneshot::Sender<u32> },

    /// Disconnect and stop the actor
    Shutdown,
}

/// Commands that can be sent to the PollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Poll all inventories now (bypassing the interval timer)
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Gracefully shut down the poller
    Shutdown,
}

/// Error flags of the inventory poller, one per resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStatus {
    pub servers_error: Option<String>,
    pub services_error: Option<String>,
}

impl PollStatus {
    pub fn has_error(&self) -> bool {
        self.servers_error.is_some() || self.services_error.is_some()
    }
}
