//! Inventory polling through the full dashboard

use monitor_feed::{Config, Dashboard};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn servers_body() -> serde_json::Value {
    serde_json::json!({
        "servers": [
            {
                "server_id": "alpha",
                "display_name": "Alpha",
                "monitoring_status": "active",
                "health_status": "up",
                "last_seen": "2024-01-01T00:00:00Z"
            },
            {
                "server_id": "beta",
                "display_name": "Beta",
                "monitoring_status": "paused",
                "health_status": "stale"
            }
        ],
        "count": 2
    })
}

fn services_body() -> serde_json::Value {
    serde_json::json!({
        "services": [
            {
                "name": "api",
                "url": "https://api.example.com/health",
                "monitoring_status": "active",
                "health_status": "up",
                "response_time_ms": 42.5,
                "last_status": "up"
            }
        ],
        "count": 1
    })
}

/// Dashboard against a mock hub; the stream endpoint is missing, so the
/// transport gives up right away
async fn start_against(mock_server: &MockServer) -> Dashboard {
    let config = Config {
        api_url: mock_server.uri(),
        api_token: Some("test-token".to_string()),
        max_reconnect_attempts: 0,
        poll_interval_ms: 60_000,
        request_timeout_secs: 2,
        ..Config::default()
    };
    Dashboard::start(&config).await.unwrap()
}

#[tokio::test]
async fn test_inventory_loaded_at_startup() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/servers"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(servers_body()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/services"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(services_body()))
        .mount(&mock_server)
        .await;

    let dashboard = start_against(&mock_server).await;

    let snapshot = wait_for_store(dashboard.store(), |s| {
        !s.servers.is_empty() && !s.services.is_empty()
    })
    .await;

    let ids: Vec<&str> = snapshot.servers.iter().map(|s| s.server_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "beta"]);
    assert_eq!(snapshot.services[0].name, "api");
    assert_eq!(snapshot.services[0].response_time_ms, Some(42.5));
    assert!(!dashboard.poller().status().has_error());

    // Inventory alone never marks the stream connected
    assert!(!snapshot.connected);

    dashboard.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_inventory() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/servers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(servers_body()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(services_body()))
        .mount(&mock_server)
        .await;

    let dashboard = start_against(&mock_server).await;
    wait_for_store(dashboard.store(), |s| s.servers.len() == 2 && s.services.len() == 1).await;

    // Hub starts failing
    mock_server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    assert!(dashboard.poller().poll_now().await.is_err());

    let snapshot = dashboard.store().snapshot().await.unwrap();
    assert_eq!(snapshot.servers.len(), 2);
    assert_eq!(snapshot.services.len(), 1);

    let status = dashboard.poller().status();
    assert!(status.servers_error.is_some());
    assert!(status.services_error.is_some());

    dashboard.shutdown().await.unwrap();
}
