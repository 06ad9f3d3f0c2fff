//! Streaming connection I/O
//!
//! [`StreamConnector`] opens one connection and hands back the text frames it
//! receives. Reconnect policy lives in the transport actor, not here, so the
//! socket side and the retry logic can be tested on their own.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream::BoxStream};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest, http::Uri},
};
use tracing::{debug, info, trace};

use crate::error::{FeedError, FeedResult};

/// Path of the event stream on the hub
pub const STREAM_PATH: &str = "/api/v1/stream";

/// Interval between keep-alive pings
const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Inbound text frames of one connection. The stream ends when the
/// connection closes; an `Err` item means it broke.
pub type FrameStream = BoxStream<'static, FeedResult<String>>;

/// Opens streaming connections
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a new connection. Resolves once the connection is established.
    async fn connect(&self) -> FeedResult<FrameStream>;

    /// Endpoint description for logging
    fn endpoint(&self) -> String;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector for the hub's event stream
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    auth_token: Option<String>,
}

impl WebSocketConnector {
    pub fn new(api_url: &str, auth_token: Option<String>) -> Self {
        // Convert http:// to ws:// and https:// to wss://
        let ws_url = api_url
            .trim_end_matches('/')
            .replace("http://", "ws://")
            .replace("https://", "wss://");

        Self {
            url: format!("{}{}", ws_url, STREAM_PATH),
            auth_token,
        }
    }

    /// Stream URL without credentials
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stream URL with the token as form-encoded query parameter
    fn request_url(&self) -> String {
        match &self.auth_token {
            Some(token) => {
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("token", token)
                    .finish();
                format!("{}?{}", self.url, query)
            }
            None => self.url.clone(),
        }
    }

    async fn open(&self) -> FeedResult<WsStream> {
        let url = self.request_url();

        let uri: Uri = url
            .parse()
            .map_err(|e| FeedError::Transport(format!("invalid stream URL: {e}")))?;

        let host = uri
            .authority()
            .ok_or_else(|| FeedError::Transport("stream URL missing host".to_string()))?
            .as_str()
            .to_string();

        let scheme = uri
            .scheme_str()
            .ok_or_else(|| FeedError::Transport("stream URL missing scheme".to_string()))?;

        // Origin mirrors the scheme (wss -> https, ws -> http) for reverse proxies
        let origin_scheme = if scheme == "wss" { "https" } else { "http" };
        let origin = format!("{}://{}", origin_scheme, host);

        // into_client_request() keeps the TLS/SNI configuration intact
        let mut request = url.into_client_request()?;

        let headers = request.headers_mut();
        headers.insert("Origin", header_value(&origin)?);
        headers.insert(
            "User-Agent",
            header_value(concat!("monitor-feed/", env!("CARGO_PKG_VERSION")))?,
        );

        debug!("connecting to {} (origin={})", self.url, origin);

        let (ws_stream, _) = connect_async(request).await?;

        Ok(ws_stream)
    }
}

fn header_value(value: &str) -> FeedResult<tokio_tungstenite::tungstenite::http::HeaderValue> {
    value
        .parse()
        .map_err(|_| FeedError::Transport(format!("invalid header value: {value}")))
}

/// Read half plus the keep-alive task that owns the write half
struct Session {
    read: futures::stream::SplitStream<WsStream>,
    ping_task: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.ping_task.abort();
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self) -> FeedResult<FrameStream> {
        let ws_stream = self.open().await?;

        info!("stream connected to {}", self.url);

        let (mut write, read) = ws_stream.split();

        let ping_task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(PING_INTERVAL).await;
                if write.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        let session = Session { read, ping_task };

        let frames = futures::stream::unfold(session, |mut session| async move {
            loop {
                match session.read.next().await? {
                    Ok(Message::Text(text)) => return Some((Ok(text), session)),
                    Ok(Message::Close(frame)) => {
                        info!("stream closed by server: {:?}", frame);
                        return None;
                    }
                    Ok(other) => {
                        trace!("ignoring non-text frame ({} bytes)", other.len());
                    }
                    Err(e) => return Some((Err(FeedError::from(e)), session)),
                }
            }
        });

        Ok(frames.boxed())
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
