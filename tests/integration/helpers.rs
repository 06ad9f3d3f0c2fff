//! Helper functions for integration tests

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use monitor_feed::{Config, StoreHandle, StoreSnapshot};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    Message,
    handshake::server::{ErrorResponse, Request, Response},
};

/// Config pointing at `addr` with fast retries and a slow poller
pub fn test_config(addr: SocketAddr) -> Config {
    Config {
        api_url: format!("http://{addr}"),
        api_token: Some("test-token".to_string()),
        reconnect_interval_ms: 50,
        max_reconnect_attempts: 3,
        poll_interval_ms: 60_000,
        request_timeout_secs: 2,
        ..Config::default()
    }
}

/// One accepted stream connection
pub struct ServerConnection {
    /// Request URI including the query string
    pub uri: String,
    outbound: mpsc::UnboundedSender<Message>,
}

impl ServerConnection {
    pub fn send_text(&self, text: impl Into<String>) {
        self.outbound.send(Message::Text(text.into())).unwrap();
    }

    pub fn send_json(&self, value: serde_json::Value) {
        self.send_text(value.to_string());
    }

    /// Close the connection from the server side
    pub fn close(self) {
        let _ = self.outbound.send(Message::Close(None));
    }
}

/// Minimal stream server: accepts WebSocket upgrades on a random port
pub struct StreamServer {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
}

impl StreamServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let mut uri = String::new();
                    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        uri = req.uri().to_string();
                        Ok(resp)
                    };

                    // Plain HTTP requests (the poller) fail the handshake
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                        return;
                    };

                    let (mut write, mut read) = ws.split();
                    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
                    if conn_tx.send(ServerConnection { uri, outbound }).is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            msg = outbound_rx.recv() => {
                                let Some(msg) = msg else { break };
                                let closing = matches!(msg, Message::Close(_));
                                if write.send(msg).await.is_err() || closing {
                                    break;
                                }
                            }
                            incoming = read.next() => {
                                match incoming {
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self { addr, connections }
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> ServerConnection {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("timed out waiting for a stream connection")
            .expect("stream server stopped")
    }

    /// Expect no further connection within `within`
    pub async fn assert_no_connection(&mut self, within: Duration) {
        let result = tokio::time::timeout(within, self.connections.recv()).await;
        assert!(result.is_err(), "unexpected stream connection");
    }
}

/// Poll the store until `predicate` holds, or panic after a few seconds
pub async fn wait_for_store<F>(store: &StoreHandle, predicate: F) -> StoreSnapshot
where
    F: Fn(&StoreSnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = store.snapshot().await.unwrap();
        if predicate(&snapshot) {
            return snapshot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "store never reached the expected state: {snapshot:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// RFC 3339 timestamp `secs_ago` seconds in the past
pub fn recent(secs_ago: i64) -> String {
    (chrono::Utc::now() - chrono::Duration::seconds(secs_ago))
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn metric_frame(server_id: &str, timestamp: &str, metrics: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "metric",
        "server_id": server_id,
        "timestamp": timestamp,
        "metrics": metrics,
    })
}

pub fn service_check_frame(service: &str, timestamp: &str, status: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "service_check",
        "service_name": service,
        "timestamp": timestamp,
        "status": status,
        "url": "https://api.example.com/health",
    })
}
