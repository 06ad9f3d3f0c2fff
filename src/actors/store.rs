//! StoreActor - Single owner of the monitoring state
//!
//! All writers (transport, router, poller) and readers (presentation) talk to
//! the state through a [`StoreHandle`]. The actor drains its command channel
//! one message at a time, so there is exactly one writer and no lock.
//!
//! ## Message Flow
//!
//! ```text
//! Transport ─┐
//! Router ────┼──> mpsc ──> StoreActor (MonitorState) ──> watch<revision>
//! Poller ────┘                  ↑
//!                               └─── Snapshot / MetricsHistory / Alerts queries
//! ```

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, instrument, trace, warn};

use crate::state::{AlertEntry, MetricPoint, MonitorState, StoreSnapshot, StoreStats};
use crate::types::{ServerInfo, ServiceInfo};

use super::messages::StoreCommand;

/// Capacity of the command channel. Senders wait when it is full, which keeps
/// arrival order intact instead of dropping.
const COMMAND_BUFFER: usize = 1024;

/// Actor owning the [`MonitorState`]
pub struct StoreActor {
    state: MonitorState,

    command_rx: mpsc::Receiver<StoreCommand>,

    /// Revision published after every applied mutation
    revision_tx: watch::Sender<u64>,
}

impl StoreActor {
    pub fn new(
        state: MonitorState,
        command_rx: mpsc::Receiver<StoreCommand>,
        revision_tx: watch::Sender<u64>,
    ) -> Self {
        Self {
            state,
            command_rx,
            revision_tx,
        }
    }

    /// Run the actor's main loop until Shutdown or until all handles are gone
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting store actor");

        while let Some(cmd) = self.command_rx.recv().await {
            if !self.handle(cmd) {
                break;
            }
        }

        debug!("store actor stopped");
    }

    /// Apply one command. Returns false on shutdown.
    fn handle(&mut self, cmd: StoreCommand) -> bool {
        match cmd {
            StoreCommand::SetConnected(connected) => {
                trace!("connected = {connected}");
                self.state.set_connected(connected);
            }
            StoreCommand::SetServers(servers) => {
                trace!("replacing server inventory ({} entries)", servers.len());
                self.state.set_servers(servers);
            }
            StoreCommand::SetServices(services) => {
                trace!("replacing service inventory ({} entries)", services.len());
                self.state.set_services(services);
            }
            StoreCommand::AddMetricPoint { entity_id, point } => {
                self.state.add_metric_point(entity_id, point);
            }
            StoreCommand::SetMetricsHistory { entity_id, points } => {
                debug!("installing {} points for {entity_id}", points.len());
                self.state.set_metrics_history(entity_id, points);
            }
            StoreCommand::PrependMetricsHistory { entity_id, points } => {
                let offered = points.len();
                let merged = self.state.prepend_metrics_history(entity_id.clone(), points);
                debug!("merged {merged} of {offered} older points for {entity_id}");
            }
            StoreCommand::ClearMetricsHistory { entity_id } => {
                debug!("clearing history for {entity_id}");
                self.state.clear_metrics_history(&entity_id);
            }
            StoreCommand::AddAlert(alert) => {
                debug!("alert {} ({:?})", alert.id, alert.severity);
                self.state.add_alert(alert);
            }
            StoreCommand::SetTimeWindow { seconds } => {
                debug!("time window set to {seconds}s");
                self.state.set_time_window(seconds);
            }
            StoreCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.state.snapshot());
            }
            StoreCommand::MetricsHistory {
                entity_id,
                respond_to,
            } => {
                let points = self
                    .state
                    .get_metrics_history(&entity_id)
                    .map(|history| history.iter().cloned().collect())
                    .unwrap_or_default();
                let _ = respond_to.send(points);
            }
            StoreCommand::Alerts { respond_to } => {
                let _ = respond_to.send(self.state.alerts.iter().cloned().collect());
            }
            StoreCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.state.stats());
            }
            StoreCommand::Shutdown => {
                debug!("received shutdown command");
                return false;
            }
        }

        self.publish_revision();
        true
    }

    fn publish_revision(&self) {
        let revision = self.state.revision;
        self.revision_tx.send_if_modified(|current| {
            if *current == revision {
                return false;
            }
            *current = revision;
            true
        });
    }
}

/// Handle for talking to the StoreActor
///
/// Cheap to clone; every producer gets its own copy.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreCommand>,
    revision_rx: watch::Receiver<u64>,
}

impl StoreHandle {
    /// Spawn a new store actor
    pub fn spawn(time_window_seconds: u64) -> Self {
        Self::spawn_with_state(MonitorState::new(time_window_seconds))
    }

    /// Spawn a store actor around an existing state
    pub fn spawn_with_state(state: MonitorState) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (revision_tx, revision_rx) = watch::channel(state.revision);

        let actor = StoreActor::new(state, cmd_rx, revision_tx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            revision_rx,
        }
    }

    async fn send(&self, cmd: StoreCommand) -> Result<()> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| anyhow::anyhow!("store actor is not running"))
    }

    pub async fn set_connected(&self, connected: bool) -> Result<()> {
        self.send(StoreCommand::SetConnected(connected))
            .await
            .context("failed to send SetConnected command")
    }

    pub async fn set_servers(&self, servers: Vec<ServerInfo>) -> Result<()> {
        self.send(StoreCommand::SetServers(servers))
            .await
            .context("failed to send SetServers command")
    }

    pub async fn set_services(&self, services: Vec<ServiceInfo>) -> Result<()> {
        self.send(StoreCommand::SetServices(services))
            .await
            .context("failed to send SetServices command")
    }

    pub async fn add_metric_point(&self, entity_id: String, point: MetricPoint) -> Result<()> {
        self.send(StoreCommand::AddMetricPoint { entity_id, point })
            .await
            .context("failed to send AddMetricPoint command")
    }

    pub async fn set_metrics_history(&self, entity_id: String, points: Vec<MetricPoint>) -> Result<()> {
        self.send(StoreCommand::SetMetricsHistory { entity_id, points })
            .await
            .context("failed to send SetMetricsHistory command")
    }

    pub async fn prepend_metrics_history(
        &self,
        entity_id: String,
        points: Vec<MetricPoint>,
    ) -> Result<()> {
        self.send(StoreCommand::PrependMetricsHistory { entity_id, points })
            .await
            .context("failed to send PrependMetricsHistory command")
    }

    pub async fn clear_metrics_history(&self, entity_id: String) -> Result<()> {
        self.send(StoreCommand::ClearMetricsHistory { entity_id })
            .await
            .context("failed to send ClearMetricsHistory command")
    }

    pub async fn add_alert(&self, alert: AlertEntry) -> Result<()> {
        self.send(StoreCommand::AddAlert(alert))
            .await
            .context("failed to send AddAlert command")
    }

    pub async fn set_time_window(&self, seconds: u64) -> Result<()> {
        self.send(StoreCommand::SetTimeWindow { seconds })
            .await
            .context("failed to send SetTimeWindow command")
    }

    /// Get a full copy of the current state
    pub async fn snapshot(&self) -> Result<StoreSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::Snapshot { respond_to: tx })
            .await
            .context("failed to send Snapshot command")?;
        rx.await.context("failed to receive snapshot")
    }

    pub async fn metrics_history(&self, entity_id: &str) -> Result<Vec<MetricPoint>> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::MetricsHistory {
            entity_id: entity_id.to_string(),
            respond_to: tx,
        })
        .await
        .context("failed to send MetricsHistory command")?;
        rx.await.context("failed to receive metrics history")
    }

    pub async fn alerts(&self) -> Result<Vec<AlertEntry>> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::Alerts { respond_to: tx })
            .await
            .context("failed to send Alerts command")?;
        rx.await.context("failed to receive alerts")
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let (tx, rx) = oneshot::channel();
        self.send(StoreCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;
        rx.await.context("failed to receive stats")
    }

    /// Subscribe to change notifications
    ///
    /// The receiver yields the store revision; call [`StoreHandle::snapshot`]
    /// after it changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_rx.clone()
    }

    /// Gracefully shut down the store
    pub async fn shutdown(&self) -> Result<()> {
        if self.sender.send(StoreCommand::Shutdown).await.is_err() {
            warn!("store actor already stopped");
        }
        Ok(())
    }
}
