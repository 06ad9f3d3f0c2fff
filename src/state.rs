//! Bounded monitoring state
//!
//! Holds everything the presentation layer reads: connection flag, server and
//! service inventories, per-entity metric history and the alert log. Both
//! buffers are bounded on every mutation:
//!
//! - metric history: points with `timestamp <= now - 2 * time_window` are
//!   dropped, then only the newest [`MAX_POINTS_PER_ENTITY`] are kept
//! - alerts: newest first, at most [`MAX_ALERTS`]
//!
//! This type is plain data. Serialized access is provided by
//! [`crate::actors::store::StoreActor`], which owns the only instance.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;

use crate::{
    events::MetricPayload,
    types::{ServerInfo, ServiceInfo},
};

/// Maximum number of metric points to keep in memory per entity
pub const MAX_POINTS_PER_ENTITY: usize = 1000;

/// Maximum number of alerts to keep in memory
pub const MAX_ALERTS: usize = 500;

/// Default presentation window (5 minutes)
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 300;

/// Metric data point with timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub entity_id: String,
    pub data: MetricPayload,
}

/// What produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Metric,
    Service,
    Info,
}

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Alert entry for the alerts timeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
}

impl AlertEntry {
    /// Deterministic alert id: `<source>-<timestamp>`
    ///
    /// The timestamp is rendered as RFC 3339 in UTC with a `Z` suffix, so
    /// repeated reports of the same check share an id. This is not the wire
    /// string: `02:00:00+02:00` becomes `00:00:00Z` and `.25Z` becomes
    /// `.250Z`.
    pub fn derive_id(source: &str, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}-{}",
            source,
            timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

/// Full copy of the state handed to readers
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSnapshot {
    pub connected: bool,
    pub servers: Vec<ServerInfo>,
    pub services: Vec<ServiceInfo>,
    pub metrics_history: HashMap<String, Vec<MetricPoint>>,
    pub alerts: Vec<AlertEntry>,
    pub time_window_seconds: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub revision: u64,
}

/// Counters describing the store contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub servers: usize,
    pub services: usize,
    pub entities: usize,
    pub points: usize,
    pub alerts: usize,
    pub revision: u64,
}

/// Monitoring state
#[derive(Debug)]
pub struct MonitorState {
    /// Connection status, written only by the transport
    pub connected: bool,

    pub servers: Vec<ServerInfo>,

    pub services: Vec<ServiceInfo>,

    /// Metric history per entity, in arrival order
    pub metrics_history: HashMap<String, VecDeque<MetricPoint>>,

    /// Alert timeline, newest first
    pub alerts: VecDeque<AlertEntry>,

    pub time_window_seconds: u64,

    /// Last metric insertion
    pub last_update: Option<DateTime<Utc>>,

    /// Bumped on every applied mutation
    pub revision: u64,
}

impl MonitorState {
    pub fn new(time_window_seconds: u64) -> Self {
        Self {
            connected: false,
            servers: Vec::new(),
            services: Vec::new(),
            metrics_history: HashMap::new(),
            alerts: VecDeque::new(),
            time_window_seconds,
            last_update: None,
            revision: 0,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        self.touch();
    }

    /// Replace the server inventory
    pub fn set_servers(&mut self, servers: Vec<ServerInfo>) {
        self.servers = servers;
        self.touch();
    }

    /// Replace the service inventory
    pub fn set_services(&mut self, services: Vec<ServiceInfo>) {
        self.services = services;
        self.touch();
    }

    /// Append a point to an entity's history and evict
    pub fn add_metric_point(&mut self, entity_id: String, point: MetricPoint) {
        self.add_metric_point_at(entity_id, point, Utc::now());
    }

    /// Same as [`MonitorState::add_metric_point`] with an explicit clock
    pub fn add_metric_point_at(&mut self, entity_id: String, point: MetricPoint, now: DateTime<Utc>) {
        let cutoff = self.retention_cutoff(now);
        let history = self.metrics_history.entry(entity_id).or_default();

        history.push_back(point);
        evict(history, cutoff);

        self.last_update = Some(now);
        self.touch();
    }

    /// Replace an entity's history wholesale
    ///
    /// The same eviction rules as for single insertions are applied, so the
    /// history invariant holds no matter where the points came from.
    pub fn set_metrics_history(&mut self, entity_id: String, points: Vec<MetricPoint>) {
        self.set_metrics_history_at(entity_id, points, Utc::now());
    }

    pub fn set_metrics_history_at(
        &mut self,
        entity_id: String,
        points: Vec<MetricPoint>,
        now: DateTime<Utc>,
    ) {
        let cutoff = self.retention_cutoff(now);
        let mut history = VecDeque::from(points);
        evict(&mut history, cutoff);

        self.metrics_history.insert(entity_id, history);
        self.touch();
    }

    /// Merge older points in front of an entity's live history
    ///
    /// `points` are oldest first. Only points strictly older than every
    /// point already held are taken, so whatever the stream delivered in the
    /// meantime stays in place and in arrival order. Returns how many points
    /// were merged before eviction.
    pub fn prepend_metrics_history(&mut self, entity_id: String, points: Vec<MetricPoint>) -> usize {
        self.prepend_metrics_history_at(entity_id, points, Utc::now())
    }

    pub fn prepend_metrics_history_at(
        &mut self,
        entity_id: String,
        points: Vec<MetricPoint>,
        now: DateTime<Utc>,
    ) -> usize {
        let cutoff = self.retention_cutoff(now);
        let history = self.metrics_history.entry(entity_id).or_default();
        let oldest_live = history.iter().map(|p| p.timestamp).min();

        let older: Vec<MetricPoint> = points
            .into_iter()
            .filter(|p| oldest_live.is_none_or(|oldest| p.timestamp < oldest))
            .collect();
        let merged = older.len();

        for point in older.into_iter().rev() {
            history.push_front(point);
        }
        evict(history, cutoff);

        self.touch();
        merged
    }

    pub fn clear_metrics_history(&mut self, entity_id: &str) {
        if self.metrics_history.remove(entity_id).is_some() {
            self.touch();
        }
    }

    /// Add an alert to the head of the timeline
    ///
    /// Alerts are not deduplicated here; two entries with the same id both
    /// occupy a slot.
    pub fn add_alert(&mut self, alert: AlertEntry) {
        self.alerts.push_front(alert);
        self.alerts.truncate(MAX_ALERTS);
        self.touch();
    }

    /// Update the window. Existing history is left alone until the next
    /// insertion for each entity.
    pub fn set_time_window(&mut self, seconds: u64) {
        self.time_window_seconds = seconds;
        self.touch();
    }

    /// Get metrics history for an entity
    pub fn get_metrics_history(&self, entity_id: &str) -> Option<&VecDeque<MetricPoint>> {
        self.metrics_history.get(entity_id)
    }

    /// Points that fall into the presentation window (`now - time_window`)
    pub fn windowed_points(&self, entity_id: &str, now: DateTime<Utc>) -> Vec<&MetricPoint> {
        let start = seconds_before(now, self.time_window_seconds);

        self.metrics_history
            .get(entity_id)
            .map(|history| history.iter().filter(|p| p.timestamp > start).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            connected: self.connected,
            servers: self.servers.clone(),
            services: self.services.clone(),
            metrics_history: self
                .metrics_history
                .iter()
                .map(|(id, history)| (id.clone(), history.iter().cloned().collect()))
                .collect(),
            alerts: self.alerts.iter().cloned().collect(),
            time_window_seconds: self.time_window_seconds,
            last_update: self.last_update,
            revision: self.revision,
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            servers: self.servers.len(),
            services: self.services.len(),
            entities: self.metrics_history.len(),
            points: self.metrics_history.values().map(VecDeque::len).sum(),
            alerts: self.alerts.len(),
            revision: self.revision,
        }
    }

    /// Points at or before this instant are evicted
    fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        seconds_before(now, self.time_window_seconds.saturating_mul(2))
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_WINDOW_SECS)
    }
}

/// Two-phase eviction: time cutoff first, then the count cap from the front
fn evict(history: &mut VecDeque<MetricPoint>, cutoff: DateTime<Utc>) {
    history.retain(|p| p.timestamp > cutoff);

    if history.len() > MAX_POINTS_PER_ENTITY {
        let excess = history.len() - MAX_POINTS_PER_ENTITY;
        history.drain(..excess);
    }
}

/// `now - seconds`, saturating at the earliest representable instant
fn seconds_before(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
