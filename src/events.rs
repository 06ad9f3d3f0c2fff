//! Stream event types
//!
//! The hub pushes JSON frames tagged by a `type` field. Anything with a type
//! we do not know deserializes to [`StreamEvent::Unknown`] and is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{FeedError, FeedResult},
    types::ServiceCheckStatus,
};

/// Metric categories the router accepts as evidence of a real sample
pub const RECOGNIZED_CATEGORIES: &[&str] = &["cpus", "temperatures"];

/// Opaque metric payload as sent by the hub
///
/// The store never looks inside. The only check anybody performs is
/// [`MetricPayload::has_recognized_category`], done by the router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricPayload(pub serde_json::Map<String, serde_json::Value>);

impl MetricPayload {
    /// True if at least one recognized category is present and not null
    pub fn has_recognized_category(&self) -> bool {
        RECOGNIZED_CATEGORIES
            .iter()
            .any(|key| self.0.get(*key).is_some_and(|value| !value.is_null()))
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

impl From<serde_json::Value> for MetricPayload {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => MetricPayload(map),
            _ => MetricPayload::default(),
        }
    }
}

/// A metric sample for one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Server identifier (format: "ip:port")
    pub server_id: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metrics: MetricPayload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Result of a single service check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCheckEvent {
    pub service_name: String,

    pub timestamp: DateTime<Utc>,

    pub status: ServiceCheckStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Inbound stream event, closed over the kinds this client understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Metric(MetricEvent),
    ServiceCheck(ServiceCheckEvent),
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Parse one text frame
    pub fn parse(text: &str) -> FeedResult<Self> {
        serde_json::from_str(text).map_err(|e| FeedError::MalformedEvent(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Metric(_) => "metric",
            StreamEvent::ServiceCheck(_) => "service_check",
            StreamEvent::Unknown => "unknown",
        }
    }
}
