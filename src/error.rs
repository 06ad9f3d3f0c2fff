//! Error types for the feed core
//!
//! None of these are fatal. Transport errors are recovered by the reconnect
//! loop, malformed events are dropped, fetch errors keep the previous
//! inventory around. The worst outcome is a stale or disconnected view.

use std::fmt;

/// Result type alias for feed operations
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors that can occur while ingesting the live feed
#[derive(Debug)]
pub enum FeedError {
    /// Connection failed to open or was closed unexpectedly
    Transport(String),

    /// Inbound frame could not be parsed or failed validation
    MalformedEvent(String),

    /// Inventory request failed (network, HTTP status or body)
    Fetch(String),

    /// Reconnection attempts are used up
    ReconnectExhausted { attempts: u32 },
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Transport(msg) => write!(f, "stream transport error: {}", msg),
            FeedError::MalformedEvent(msg) => write!(f, "malformed stream event: {}", msg),
            FeedError::Fetch(msg) => write!(f, "inventory fetch failed: {}", msg),
            FeedError::ReconnectExhausted { attempts } => {
                write!(f, "gave up reconnecting after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for FeedError {}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Fetch(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::MalformedEvent(err.to_string())
    }
}
