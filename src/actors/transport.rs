//! TransportActor - Owns the streaming connection and its reconnect policy
//!
//! ## Reconnection
//!
//! Retries use a **fixed interval**, not exponential backoff. On every close
//! (clean, broken, or a failed open) the actor checks the attempt counter:
//!
//! - `attempts < max_attempts`: increment, replace any pending timer, retry
//!   after `interval`
//! - otherwise: state becomes [`ConnectionState::Exhausted`] and nothing is
//!   scheduled until someone calls `connect()` again
//!
//! Only a successful open resets the counter. A manual `connect()` after
//! exhaustion that fails again goes straight back to `Exhausted`.
//!
//! ## Message Flow
//!
//! ```text
//! connect() ──> session task ──> StreamConnector::connect()
//!                   │ Opened / Closed         │ text frames
//!                   ▼                         ▼
//!            TransportActor            parse ──> mpsc<StreamEvent> ──> Router
//!                   │
//!                   └──> watch<ConnectionState>, StoreHandle::set_connected
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    connector::StreamConnector,
    error::FeedError,
    events::StreamEvent,
};

use super::{
    messages::{ConnectionState, TransportCommand},
    store::StoreHandle,
};

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of reconnect attempts before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Fixed-interval retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Lifecycle notifications from a session task
///
/// Tagged with the generation that spawned the session, so anything coming
/// from a session we already abandoned is ignored.
#[derive(Debug)]
enum SessionEvent {
    Opened { generation: u64 },
    Closed { generation: u64, reason: Option<String> },
}

/// Actor that keeps one streaming connection alive
pub struct TransportActor {
    connector: Arc<dyn StreamConnector>,

    policy: ReconnectPolicy,

    command_rx: mpsc::Receiver<TransportCommand>,

    session_tx: mpsc::UnboundedSender<SessionEvent>,
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,

    /// Parsed events go here, in arrival order
    event_tx: mpsc::UnboundedSender<StreamEvent>,

    store: StoreHandle,

    state_tx: watch::Sender<ConnectionState>,

    /// Reconnect attempts since the last successful open
    attempts: u32,

    /// Bumped for every new session and on disconnect
    generation: u64,

    /// Session task while a connection is opening or open
    session: Option<JoinHandle<()>>,

    /// Pending reconnect timer
    retry_at: Option<Instant>,
}

impl TransportActor {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        policy: ReconnectPolicy,
        command_rx: mpsc::Receiver<TransportCommand>,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        store: StoreHandle,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        Self {
            connector,
            policy,
            command_rx,
            session_tx,
            session_rx,
            event_tx,
            store,
            state_tx,
            attempts: 0,
            generation: 0,
            session: None,
            retry_at: None,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or all handles are dropped.
    #[instrument(skip(self), fields(endpoint = %self.connector.endpoint()))]
    pub async fn run(mut self) {
        debug!("starting transport actor");

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(TransportCommand::Connect) => self.connect(),
                        Some(TransportCommand::Disconnect) => self.disconnect().await,
                        Some(TransportCommand::GetAttempts { respond_to }) => {
                            let _ = respond_to.send(self.attempts);
                        }
                        Some(TransportCommand::Shutdown) | None => {
                            debug!("shutting down transport");
                            self.disconnect().await;
                            break;
                        }
                    }
                }

                Some(event) = self.session_rx.recv() => {
                    self.on_session_event(event).await;
                }

                _ = wait_for_retry(retry_at) => {
                    self.retry_at = None;
                    debug!("reconnect timer fired");
                    self.connect();
                }
            }
        }

        debug!("transport actor stopped");
    }

    /// Open a connection unless one is already open or opening
    fn connect(&mut self) {
        if self.session.is_some() {
            trace!("connect ignored, connection already open or opening");
            return;
        }

        self.retry_at = None;
        self.generation += 1;
        self.set_state(ConnectionState::Connecting);

        info!("connecting to {}", self.connector.endpoint());

        let generation = self.generation;
        let connector = self.connector.clone();
        let session_tx = self.session_tx.clone();
        let event_tx = self.event_tx.clone();

        self.session = Some(tokio::spawn(async move {
            let reason = run_session(connector, generation, &session_tx, event_tx).await;
            let _ = session_tx.send(SessionEvent::Closed { generation, reason });
        }));
    }

    /// Cancel pending retries and close the active connection
    async fn disconnect(&mut self) {
        self.retry_at = None;

        if let Some(session) = self.session.take() {
            info!("closing stream connection");
            session.abort();
        }

        // anything the aborted session still had in flight is now stale
        self.generation += 1;

        self.set_state(ConnectionState::Disconnected);
        self.publish_connected(false).await;
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { generation } if generation == self.generation => {
                info!("stream connection open");
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                self.publish_connected(true).await;
            }
            SessionEvent::Closed { generation, reason } if generation == self.generation => {
                match &reason {
                    Some(reason) => warn!("stream connection lost: {reason}"),
                    None => info!("stream connection closed"),
                }
                self.session = None;
                self.set_state(ConnectionState::Disconnected);
                self.publish_connected(false).await;
                self.schedule_reconnect();
            }
            stale => {
                trace!("ignoring stale session event: {stale:?}");
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            self.retry_at = Some(Instant::now() + self.policy.interval);
            info!(
                "reconnecting in {:?} (attempt {}/{})",
                self.policy.interval, self.attempts, self.policy.max_attempts
            );
        } else {
            self.retry_at = None;
            warn!(
                "{}",
                FeedError::ReconnectExhausted {
                    attempts: self.attempts
                }
            );
            self.set_state(ConnectionState::Exhausted);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        debug!("connection state -> {state}");
        self.state_tx.send_replace(state);
    }

    async fn publish_connected(&self, connected: bool) {
        if let Err(e) = self.store.set_connected(connected).await {
            warn!("failed to update connection flag: {:#}", e);
        }
    }
}

/// Sleep until the retry instant, or forever if none is pending
async fn wait_for_retry(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Drive one connection until it closes. Returns the close reason, `None`
/// for a clean close.
async fn run_session(
    connector: Arc<dyn StreamConnector>,
    generation: u64,
    session_tx: &mpsc::UnboundedSender<SessionEvent>,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
) -> Option<String> {
    let mut frames = match connector.connect().await {
        Ok(frames) => frames,
        Err(e) => return Some(e.to_string()),
    };

    let _ = session_tx.send(SessionEvent::Opened { generation });

    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => return Some(e.to_string()),
        };

        match StreamEvent::parse(&text) {
            Ok(event) => {
                trace!("received {} event", event.kind());
                if event_tx.send(event).is_err() {
                    return Some("event receiver dropped".to_string());
                }
            }
            Err(e) => {
                warn!("dropping frame: {e}");
                trace!("raw frame: {text}");
            }
        }
    }

    None
}

/// Handle for controlling a TransportActor
#[derive(Clone)]
pub struct TransportHandle {
    sender: mpsc::Sender<TransportCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl TransportHandle {
    /// Spawn a transport actor. It stays disconnected until `connect()`.
    pub fn spawn(
        connector: Arc<dyn StreamConnector>,
        policy: ReconnectPolicy,
        store: StoreHandle,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = TransportActor::new(connector, policy, cmd_rx, event_tx, store, state_tx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            state_rx,
        }
    }

    /// Open the stream (no-op if open or opening)
    pub async fn connect(&self) -> Result<()> {
        self.sender
            .send(TransportCommand::Connect)
            .await
            .context("failed to send Connect command")
    }

    /// Cancel pending retries and close the stream
    pub async fn disconnect(&self) -> Result<()> {
        self.sender
            .send(TransportCommand::Disconnect)
            .await
            .context("failed to send Disconnect command")
    }

    /// Reconnect attempts since the last successful open
    pub async fn attempts(&self) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TransportCommand::GetAttempts { respond_to: tx })
            .await
            .context("failed to send GetAttempts command")?;
        rx.await.context("failed to receive attempt count")
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Disconnect and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(TransportCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
