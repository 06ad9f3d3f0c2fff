//! EventRouter - Turns stream events into store mutations
//!
//! The router consumes the transport's event channel one event at a time and
//! awaits each store submission before reading the next, so stream arrival
//! order is the order points land in the metric history.
//!
//! Nothing escapes [`EventRouter::route`]: a failed submission is logged and
//! the event counts as discarded.

use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use crate::{
    events::{MetricEvent, ServiceCheckEvent, StreamEvent},
    state::{AlertEntry, AlertKind, AlertSeverity, MetricPoint},
    types::ServiceCheckStatus,
};

use super::store::StoreHandle;

/// What happened to a routed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A metric point was stored
    Stored,

    /// A service check produced an alert with this id
    AlertRaised(String),

    /// Valid event that needs no action (e.g. service up)
    NoAction,

    /// Event failed validation or could not be submitted
    Discarded(String),

    /// Event type this client does not know
    Ignored,
}

/// Counters kept by the router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub stored: u64,
    pub alerts_raised: u64,
    pub discarded: u64,
    pub ignored: u64,
}

/// Classifies events and submits them to the store
pub struct EventRouter {
    store: StoreHandle,
    stats: RouterStats,
}

impl EventRouter {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            stats: RouterStats::default(),
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Consume events until the channel closes
    #[instrument(skip_all)]
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<StreamEvent>) -> RouterStats {
        debug!("starting event router");

        while let Some(event) = events.recv().await {
            self.route(event).await;
        }

        debug!(
            "event router stopped ({} routed, {} discarded)",
            self.stats.routed, self.stats.discarded
        );
        self.stats
    }

    /// Route a single event
    pub async fn route(&mut self, event: StreamEvent) -> RouteOutcome {
        self.stats.routed += 1;

        let outcome = match event {
            StreamEvent::Metric(metric) => self.route_metric(metric).await,
            StreamEvent::ServiceCheck(check) => self.route_service_check(check).await,
            StreamEvent::Unknown => RouteOutcome::Ignored,
        };

        match &outcome {
            RouteOutcome::Stored => self.stats.stored += 1,
            RouteOutcome::AlertRaised(_) => self.stats.alerts_raised += 1,
            RouteOutcome::Discarded(_) => self.stats.discarded += 1,
            RouteOutcome::Ignored => self.stats.ignored += 1,
            RouteOutcome::NoAction => {}
        }

        outcome
    }

    async fn route_metric(&self, metric: MetricEvent) -> RouteOutcome {
        if !metric.metrics.has_recognized_category() {
            debug!("discarding metric for {} without recognized category", metric.server_id);
            return RouteOutcome::Discarded("no recognized metric category".to_string());
        }

        let MetricEvent {
            server_id,
            timestamp,
            metrics,
            ..
        } = metric;

        let point = MetricPoint {
            timestamp,
            entity_id: server_id.clone(),
            data: metrics,
        };

        trace!("storing metric point for {server_id}");

        match self.store.add_metric_point(server_id, point).await {
            Ok(()) => RouteOutcome::Stored,
            Err(e) => {
                warn!("dropping metric point: {:#}", e);
                RouteOutcome::Discarded(e.to_string())
            }
        }
    }

    async fn route_service_check(&self, check: ServiceCheckEvent) -> RouteOutcome {
        let Some(alert) = alert_for_check(&check) else {
            trace!("service {} is {}", check.service_name, check.status);
            return RouteOutcome::NoAction;
        };

        let id = alert.id.clone();

        match self.store.add_alert(alert).await {
            Ok(()) => RouteOutcome::AlertRaised(id),
            Err(e) => {
                warn!("dropping alert {id}: {:#}", e);
                RouteOutcome::Discarded(e.to_string())
            }
        }
    }
}

/// Build the alert a service check implies, if any
///
/// `down` is critical, `degraded` is a warning, everything else is quiet.
pub fn alert_for_check(check: &ServiceCheckEvent) -> Option<AlertEntry> {
    let (severity, condition) = match check.status {
        ServiceCheckStatus::Down => (AlertSeverity::Critical, "down"),
        ServiceCheckStatus::Degraded => (AlertSeverity::Warning, "degraded"),
        ServiceCheckStatus::Up | ServiceCheckStatus::Unknown => return None,
    };

    let message = check.error_message.clone().unwrap_or_else(|| {
        if check.status.is_failure() {
            "Service check failed".to_string()
        } else {
            "Service check reported degraded performance".to_string()
        }
    });

    Some(AlertEntry {
        id: AlertEntry::derive_id(&check.service_name, check.timestamp),
        timestamp: check.timestamp,
        kind: AlertKind::Service,
        severity,
        title: format!("Service {} is {}", check.service_name, condition),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MetricPayload;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    fn check(status: ServiceCheckStatus) -> ServiceCheckEvent {
        ServiceCheckEvent {
            service_name: "api".to_string(),
            timestamp: "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap(),
            status,
            url: None,
            response_time_ms: None,
            http_status_code: None,
            error_message: None,
        }
    }

    fn metric(server_id: &str, metrics: serde_json::Value) -> StreamEvent {
        StreamEvent::Metric(MetricEvent {
            server_id: server_id.to_string(),
            timestamp: Utc::now(),
            metrics: MetricPayload::from(metrics),
            display_name: None,
        })
    }

    #[test]
    fn test_down_check_is_critical_alert() {
        let alert = alert_for_check(&check(ServiceCheckStatus::Down)).unwrap();

        assert_eq!(alert.id, "api-2024-01-01T00:00:00Z");
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.kind, AlertKind::Service);
        assert!(alert.title.contains("api"));
        assert_eq!(alert.message, "Service check failed");
    }

    #[test]
    fn test_degraded_check_is_warning() {
        let mut degraded = check(ServiceCheckStatus::Degraded);
        degraded.error_message = Some("slow response: 2400ms".to_string());

        let alert = alert_for_check(&degraded).unwrap();
        assert_eq!(alert.severity, AlertSeverity::Warning);
        assert_eq!(alert.message, "slow response: 2400ms");
    }

    #[test]
    fn test_up_and_unknown_checks_are_quiet() {
        assert!(alert_for_check(&check(ServiceCheckStatus::Up)).is_none());
        assert!(alert_for_check(&check(ServiceCheckStatus::Unknown)).is_none());
    }

    #[tokio::test]
    async fn test_metric_without_category_is_discarded() {
        let store = StoreHandle::spawn(300);
        let mut router = EventRouter::new(store.clone());

        let outcome = router.route(metric("srv", serde_json::json!({}))).await;
        assert!(matches!(outcome, RouteOutcome::Discarded(_)));

        let outcome = router
            .route(metric("srv", serde_json::json!({ "memory": { "used": 1 } })))
            .await;
        assert!(matches!(outcome, RouteOutcome::Discarded(_)));

        assert!(store.metrics_history("srv").await.unwrap().is_empty());
        assert_eq!(router.stats().discarded, 2);

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_metric_with_category_is_stored() {
        let store = StoreHandle::spawn(300);
        let mut router = EventRouter::new(store.clone());

        let outcome = router
            .route(metric("srv", serde_json::json!({ "temperatures": [40.5] })))
            .await;
        assert_eq!(outcome, RouteOutcome::Stored);

        let history = store.metrics_history("srv").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entity_id, "srv");

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_down_reports_both_inserted() {
        let store = StoreHandle::spawn(300);
        let mut router = EventRouter::new(store.clone());

        let first = router
            .route(StreamEvent::ServiceCheck(check(ServiceCheckStatus::Down)))
            .await;
        let second = router
            .route(StreamEvent::ServiceCheck(check(ServiceCheckStatus::Down)))
            .await;
        assert_eq!(first, second);

        let alerts = store.alerts().await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.id == "api-2024-01-01T00:00:00Z"));

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let store = StoreHandle::spawn(300);
        let mut router = EventRouter::new(store.clone());

        assert_eq!(router.route(StreamEvent::Unknown).await, RouteOutcome::Ignored);
        assert_eq!(store.stats().await.unwrap().revision, 0);

        store.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_does_not_escape() {
        let store = StoreHandle::spawn(300);
        store.shutdown().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let mut router = EventRouter::new(store);
        let outcome = router
            .route(metric("srv", serde_json::json!({ "cpus": [] })))
            .await;

        assert!(matches!(outcome, RouteOutcome::Discarded(_)));
    }

    #[tokio::test]
    async fn test_run_preserves_arrival_order() {
        let store = StoreHandle::spawn(300);
        let (tx, rx) = mpsc::unbounded_channel();
        let router = tokio::spawn(EventRouter::new(store.clone()).run(rx));

        for seq in 0..50 {
            tx.send(metric("srv", serde_json::json!({ "cpus": { "seq": seq } })))
                .unwrap();
        }
        drop(tx);

        let stats = router.await.unwrap();
        assert_eq!(stats.stored, 50);

        let seqs: Vec<u64> = store
            .metrics_history("srv")
            .await
            .unwrap()
            .iter()
            .map(|p| p.data.get("cpus").unwrap()["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, (0..50).collect::<Vec<u64>>());

        store.shutdown().await.unwrap();
    }
}
