//! Inventory records and API response types
//!
//! These mirror the hub's JSON API. Unknown status strings fall back to an
//! `Unknown` variant instead of failing the whole response, since one odd
//! entry should not blank the inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::MetricPayload;

// ============================================================================
// Status Enums - Type-safe status representations
// ============================================================================

/// Monitoring status for servers and services
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringStatus {
    #[default]
    Active,
    Paused,
    Disabled,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for MonitoringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitoringStatus::Active => write!(f, "active"),
            MonitoringStatus::Paused => write!(f, "paused"),
            MonitoringStatus::Disabled => write!(f, "disabled"),
            MonitoringStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health status for servers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerHealthStatus {
    /// Server responding and metrics recent
    Up,
    /// Server not responding (polling failures)
    Down,
    /// Metrics are old but polling succeeds
    Stale,
    /// No data available
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ServerHealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerHealthStatus {
    /// Get the string representation (lowercase)
    ///
    /// This matches the serde serialization format.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerHealthStatus::Up => "up",
            ServerHealthStatus::Down => "down",
            ServerHealthStatus::Stale => "stale",
            ServerHealthStatus::Unknown => "unknown",
        }
    }
}

/// Health status for services
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealthStatus {
    /// Service responding normally
    Up,
    /// Service not responding
    Down,
    /// Service responding slowly/with errors
    Degraded,
    /// Last check is old
    Stale,
    /// No data available
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ServiceHealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServiceHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceHealthStatus::Up => "up",
            ServiceHealthStatus::Down => "down",
            ServiceHealthStatus::Degraded => "degraded",
            ServiceHealthStatus::Stale => "stale",
            ServiceHealthStatus::Unknown => "unknown",
        }
    }
}

/// Result of a single service check, as reported on the stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCheckStatus {
    Up,
    Down,
    Degraded,
    #[serde(other)]
    Unknown,
}

impl ServiceCheckStatus {
    /// Whether this status counts as a failed check
    pub fn is_failure(&self) -> bool {
        matches!(self, ServiceCheckStatus::Down)
    }
}

impl std::fmt::Display for ServiceCheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceCheckStatus::Up => write!(f, "up"),
            ServiceCheckStatus::Down => write!(f, "down"),
            ServiceCheckStatus::Degraded => write!(f, "degraded"),
            ServiceCheckStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Server information with health status
///
/// Returned by GET /api/v1/servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server identifier (format: "ip:port"), join key for metric history
    pub server_id: String,

    /// Human-readable display name
    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub monitoring_status: MonitoringStatus,

    #[serde(default)]
    pub health_status: ServerHealthStatus,

    /// Last time metrics were received (RFC 3339 timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_success: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_error: Option<String>,
}

/// Service information with health status
///
/// Returned by GET /api/v1/services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name from configuration, join key for lookups
    pub name: String,

    /// URL being monitored
    pub url: String,

    #[serde(default)]
    pub monitoring_status: MonitoringStatus,

    #[serde(default)]
    pub health_status: ServiceHealthStatus,

    /// Response time of the last check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,

    /// Last check timestamp (RFC 3339 format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<ServiceCheckStatus>,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Response for GET /api/v1/servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServersResponse {
    pub servers: Vec<ServerInfo>,
    #[serde(default)]
    pub count: usize,
}

/// Response for GET /api/v1/services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub services: Vec<ServiceInfo>,
    #[serde(default)]
    pub count: usize,
}

/// One stored metric reading as returned by the history endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub metadata: MetricPayload,
}

/// Response for GET /api/v1/servers/:id/metrics/latest (newest first)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestMetricsResponse {
    pub server_id: String,
    #[serde(default)]
    pub count: usize,
    pub metrics: Vec<HistoryRow>,
}
