//! PollerActor - Periodically refreshes the server and service inventories
//!
//! The stream only carries samples and check results; the inventories come
//! from request/response calls. The poller fetches both once at startup and
//! then on a fixed timer, writing them into the store.
//!
//! ## Failure handling
//!
//! A failed fetch keeps the previous inventory (stale beats empty) and sets
//! that resource's error flag in [`PollStatus`]. The next tick retries; there
//! is no immediate retry. Polls run inside the actor loop, so at most one
//! request per resource is ever in flight.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → GET servers → store.set_servers
//!            → GET services → store.set_services
//!            → reconcile history (clear removed, backfill new)
//!     ↑
//!     └─── Commands (PollNow, Shutdown)
//! ```

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, instrument, trace, warn};

use crate::{
    config::Config,
    error::{FeedError, FeedResult},
    state::MetricPoint,
    types::{LatestMetricsResponse, ServersResponse, ServicesResponse},
};

use super::{
    messages::{PollStatus, PollerCommand},
    store::StoreHandle,
};

pub const SERVERS_PATH: &str = "/api/v1/servers";
pub const SERVICES_PATH: &str = "/api/v1/services";

/// Settings for the inventory poller
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub api_url: String,
    pub api_token: Option<String>,
    pub interval: Duration,
    pub request_timeout: Duration,
    /// Points to backfill per newly seen server, 0 disables
    pub history_backfill_limit: usize,
}

impl From<&Config> for PollerSettings {
    fn from(config: &Config) -> Self {
        Self {
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            interval: config.poll_interval(),
            request_timeout: config.request_timeout(),
            history_backfill_limit: config.history_backfill_limit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Resource {
    Servers,
    Services,
}

/// Actor that keeps the inventories fresh
pub struct PollerActor {
    settings: PollerSettings,

    /// HTTP client (reused across requests)
    client: reqwest::Client,

    command_rx: mpsc::Receiver<PollerCommand>,

    store: StoreHandle,

    status_tx: watch::Sender<PollStatus>,

    /// Server ids of the last successful poll
    known_servers: HashSet<String>,

    /// Servers whose history was already backfilled
    backfilled: HashSet<String>,
}

impl PollerActor {
    pub fn new(
        settings: PollerSettings,
        client: reqwest::Client,
        command_rx: mpsc::Receiver<PollerCommand>,
        store: StoreHandle,
        status_tx: watch::Sender<PollStatus>,
    ) -> Self {
        Self {
            settings,
            client,
            command_rx,
            store,
            status_tx,
            known_servers: HashSet::new(),
            backfilled: HashSet::new(),
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), fields(api = %self.settings.api_url))]
    pub async fn run(mut self) {
        debug!("starting inventory poller");

        // First poll happens before any command is served
        if let Err(e) = self.poll_all().await {
            error!("initial inventory poll failed: {:#}", e);
        }

        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Timer tick - refresh inventories
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_all().await {
                        error!("inventory poll failed: {:#}", e);
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PollerCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let result = self.poll_all().await;
                            let _ = respond_to.send(result);
                        }
                        Some(PollerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        debug!("inventory poller stopped");
    }

    /// Poll both inventories. Each resource is handled independently; the
    /// result is an error if either failed.
    ///
    /// Both inventories are stored before any history is reconciled, so a
    /// slow history endpoint never holds back an inventory update.
    async fn poll_all(&mut self) -> Result<()> {
        let servers = self.poll_servers().await;
        let services = self.poll_services().await;

        let servers = match servers {
            Ok(current) => {
                self.reconcile_history(current).await;
                Ok(())
            }
            Err(e) => Err(e),
        };

        match (servers, services) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) => Err(e.context("server inventory")),
            (Ok(()), Err(e)) => Err(e.context("service inventory")),
            (Err(servers), Err(services)) => Err(anyhow::anyhow!(
                "server inventory: {:#}; service inventory: {:#}",
                servers,
                services
            )),
        }
    }

    /// Fetch and store the server inventory. Returns the ids it contained.
    async fn poll_servers(&mut self) -> Result<HashSet<String>> {
        let response = match self.fetch::<ServersResponse>(SERVERS_PATH).await {
            Ok(response) => response,
            Err(e) => {
                self.set_error(Resource::Servers, Some(e.to_string()));
                return Err(e.into());
            }
        };

        trace!("fetched {} servers", response.servers.len());

        let current = response.servers.iter().map(|s| s.server_id.clone()).collect();
        self.store
            .set_servers(response.servers)
            .await
            .context("failed to store server inventory")?;
        self.set_error(Resource::Servers, None);

        Ok(current)
    }

    async fn poll_services(&mut self) -> Result<()> {
        let response = match self.fetch::<ServicesResponse>(SERVICES_PATH).await {
            Ok(response) => response,
            Err(e) => {
                self.set_error(Resource::Services, Some(e.to_string()));
                return Err(e.into());
            }
        };

        trace!("fetched {} services", response.services.len());

        self.store
            .set_services(response.services)
            .await
            .context("failed to store service inventory")?;
        self.set_error(Resource::Services, None);

        Ok(())
    }

    /// Drop history of servers that left the inventory and backfill the
    /// ones that joined it. Failures only cost history, so they are logged.
    async fn reconcile_history(&mut self, current: HashSet<String>) {
        for removed in self.known_servers.difference(&current) {
            debug!("server {removed} left the inventory, clearing its history");
            if let Err(e) = self.store.clear_metrics_history(removed.clone()).await {
                warn!("failed to clear history of {removed}: {:#}", e);
            }
            self.backfilled.remove(removed);
        }

        if self.settings.history_backfill_limit > 0 {
            for server_id in &current {
                if self.backfilled.contains(server_id) {
                    continue;
                }
                match self.backfill(server_id).await {
                    Ok(count) => {
                        debug!("fetched {count} history points for {server_id}");
                        self.backfilled.insert(server_id.clone());
                    }
                    Err(e) => warn!("history backfill for {server_id} failed: {:#}", e),
                }
            }
        }

        self.known_servers = current;
    }

    /// Load the latest points of one server and merge them in front of
    /// whatever the stream delivered meanwhile
    async fn backfill(&self, server_id: &str) -> Result<usize> {
        let path = format!(
            "{}/{}/metrics/latest?limit={}",
            SERVERS_PATH, server_id, self.settings.history_backfill_limit
        );
        let response = self.fetch::<LatestMetricsResponse>(&path).await?;

        // The API returns newest first; history is oldest first
        let points: Vec<MetricPoint> = response
            .metrics
            .into_iter()
            .rev()
            .map(|row| MetricPoint {
                timestamp: row.timestamp,
                entity_id: server_id.to_string(),
                data: row.metadata,
            })
            .collect();
        let count = points.len();

        self.store
            .prepend_metrics_history(server_id.to_string(), points)
            .await?;

        Ok(count)
    }

    /// Authenticated GET, decoded as JSON
    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> FeedResult<T> {
        let url = format!("{}{}", self.settings.api_url.trim_end_matches('/'), path);
        let mut request = self.client.get(&url);

        if let Some(token) = &self.settings.api_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(FeedError::Fetch(format!("HTTP error: {}", response.status())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FeedError::Fetch(format!("invalid response from {path}: {e}")))
    }

    fn set_error(&self, resource: Resource, error: Option<String>) {
        if let Some(error) = &error {
            warn!("{resource:?} poll failed, keeping previous inventory: {error}");
        }

        self.status_tx.send_if_modified(|status| {
            let slot = match resource {
                Resource::Servers => &mut status.servers_error,
                Resource::Services => &mut status.services_error,
            };
            if *slot == error {
                return false;
            }
            *slot = error;
            true
        });
    }
}

/// Handle for controlling a PollerActor
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
    status_rx: watch::Receiver<PollStatus>,
}

impl PollerHandle {
    /// Spawn a new poller. The first poll starts right away.
    pub fn spawn(settings: PollerSettings, store: StoreHandle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(PollStatus::default());

        let actor = PollerActor::new(settings, client, cmd_rx, store, status_tx);
        tokio::spawn(actor.run());

        Ok(Self {
            sender: cmd_tx,
            status_rx,
        })
    }

    /// Poll both inventories now
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Current error flags
    pub fn status(&self) -> PollStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status_rx.clone()
    }

    /// Stop polling
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
