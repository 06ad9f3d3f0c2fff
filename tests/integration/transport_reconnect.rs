//! Reconnect behavior against a real socket

use monitor_feed::{Config, ConnectionState, Dashboard};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::helpers::*;

async fn wait_for_state(dashboard: &Dashboard, expected: ConnectionState) {
    let mut rx = dashboard.transport().subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == expected))
        .await
        .expect("timed out waiting for connection state")
        .unwrap();
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let mut server = StreamServer::start().await;
    let dashboard = Dashboard::start(&test_config(server.addr)).await.unwrap();

    let first = server.accept().await;
    wait_for_store(dashboard.store(), |s| s.connected).await;

    first.close();
    let second = server.accept().await;

    wait_for_state(&dashboard, ConnectionState::Connected).await;
    wait_for_store(dashboard.store(), |s| s.connected).await;
    assert_eq!(dashboard.transport().attempts().await.unwrap(), 0);

    second.send_json(metric_frame("beta", &recent(1), serde_json::json!({ "cpus": [] })));
    wait_for_store(dashboard.store(), |s| s.metrics_history.contains_key("beta")).await;

    dashboard.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_leaves_no_reconnect() {
    let mut server = StreamServer::start().await;
    let dashboard = Dashboard::start(&test_config(server.addr)).await.unwrap();

    let conn = server.accept().await;
    wait_for_store(dashboard.store(), |s| s.connected).await;

    dashboard.shutdown().await.unwrap();
    conn.close();

    // Several reconnect intervals pass without a new connection
    server.assert_no_connection(Duration::from_millis(400)).await;
}

#[tokio::test]
async fn test_unreachable_hub_exhausts_attempts() {
    // Reserve a port and release it so nothing listens there
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = Config {
        reconnect_interval_ms: 20,
        max_reconnect_attempts: 2,
        ..test_config(addr)
    };
    let dashboard = Dashboard::start(&config).await.unwrap();

    wait_for_state(&dashboard, ConnectionState::Exhausted).await;
    assert_eq!(dashboard.transport().attempts().await.unwrap(), 2);

    let snapshot = dashboard.store().snapshot().await.unwrap();
    assert!(!snapshot.connected);

    dashboard.shutdown().await.unwrap();
}
