//! End-to-end tests: stream frames through router into the store

use monitor_feed::{ConnectionState, Dashboard, state::AlertSeverity};
use pretty_assertions::assert_eq;
use std::time::Duration;

use crate::helpers::*;

#[tokio::test]
async fn test_metric_frame_reaches_store() {
    let mut server = StreamServer::start().await;
    let dashboard = Dashboard::start(&test_config(server.addr)).await.unwrap();

    let conn = server.accept().await;
    assert!(conn.uri.starts_with("/api/v1/stream"));
    assert!(conn.uri.contains("token=test-token"));

    wait_for_store(dashboard.store(), |s| s.connected).await;

    conn.send_json(metric_frame(
        "alpha",
        &recent(1),
        serde_json::json!({ "cpus": { "average_usage": 12.5 } }),
    ));

    let snapshot = wait_for_store(dashboard.store(), |s| s.metrics_history.contains_key("alpha")).await;
    let history = &snapshot.metrics_history["alpha"];
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].entity_id, "alpha");
    assert_eq!(
        history[0].data.get("cpus").unwrap()["average_usage"].as_f64(),
        Some(12.5)
    );
    assert!(snapshot.last_update.is_some());

    dashboard.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_frames_do_not_drop_connection() {
    let mut server = StreamServer::start().await;
    let dashboard = Dashboard::start(&test_config(server.addr)).await.unwrap();
    let conn = server.accept().await;

    conn.send_text("{ not json");
    conn.send_json(serde_json::json!({ "type": "heartbeat", "seq": 1 }));
    conn.send_json(metric_frame("alpha", &recent(2), serde_json::json!({})));
    conn.send_json(metric_frame(
        "alpha",
        &recent(1),
        serde_json::json!({ "temperatures": [45.0] }),
    ));

    let snapshot = wait_for_store(dashboard.store(), |s| {
        s.connected && s.metrics_history.contains_key("alpha")
    })
    .await;
    assert_eq!(snapshot.metrics_history["alpha"].len(), 1);
    assert_eq!(dashboard.transport().state(), ConnectionState::Connected);

    // Still the first connection
    server.assert_no_connection(Duration::from_millis(200)).await;

    let stats = dashboard.shutdown().await.unwrap();
    // The malformed frame never reached the router
    assert_eq!(stats.routed, 3);
    assert_eq!(stats.ignored, 1);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.stored, 1);
}

#[tokio::test]
async fn test_down_service_raises_alert() {
    let mut server = StreamServer::start().await;
    let dashboard = Dashboard::start(&test_config(server.addr)).await.unwrap();
    let conn = server.accept().await;

    conn.send_json(service_check_frame("api", "2024-01-01T00:00:00Z", "up"));
    conn.send_json(service_check_frame("api", "2024-01-01T00:00:00Z", "down"));

    let snapshot = wait_for_store(dashboard.store(), |s| !s.alerts.is_empty()).await;
    assert_eq!(snapshot.alerts.len(), 1);

    let alert = &snapshot.alerts[0];
    assert_eq!(alert.id, "api-2024-01-01T00:00:00Z");
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert!(alert.title.contains("api"));

    dashboard.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_frames_stored_in_arrival_order() {
    let mut server = StreamServer::start().await;
    let dashboard = Dashboard::start(&test_config(server.addr)).await.unwrap();
    let conn = server.accept().await;

    // Timestamps deliberately out of order
    let timestamps = [recent(1), recent(3), recent(2)];
    for ts in &timestamps {
        conn.send_json(metric_frame("alpha", ts, serde_json::json!({ "cpus": [] })));
    }

    let snapshot = wait_for_store(dashboard.store(), |s| {
        s.metrics_history.get("alpha").is_some_and(|h| h.len() == 3)
    })
    .await;

    let stored: Vec<String> = snapshot.metrics_history["alpha"]
        .iter()
        .map(|p| p.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .collect();
    assert_eq!(stored, timestamps.to_vec());

    dashboard.shutdown().await.unwrap();
}
