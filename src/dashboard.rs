//! Wiring of the feed components
//!
//! [`Dashboard`] spawns the store, router, transport and poller, connects
//! the stream, and tears everything down again in [`Dashboard::shutdown`].
//! Presentation code only needs [`Dashboard::store`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    actors::{
        poller::{PollerHandle, PollerSettings},
        router::{EventRouter, RouterStats},
        store::StoreHandle,
        transport::TransportHandle,
    },
    config::Config,
    connector::{StreamConnector, WebSocketConnector},
};

/// How long shutdown waits for the router to drain
const ROUTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Running feed: stream and poller feeding one store
pub struct Dashboard {
    store: StoreHandle,
    transport: TransportHandle,
    poller: PollerHandle,
    router_task: JoinHandle<RouterStats>,
}

impl Dashboard {
    /// Start all components against the hub from `config` and connect
    pub async fn start(config: &Config) -> Result<Self> {
        let connector = WebSocketConnector::new(&config.api_url, config.api_token.clone());
        Self::start_with_connector(config, Arc::new(connector)).await
    }

    /// Same as [`Dashboard::start`] with a custom stream connector
    pub async fn start_with_connector(
        config: &Config,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self> {
        let store = StoreHandle::spawn(config.time_window_seconds);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let router_task = tokio::spawn(EventRouter::new(store.clone()).run(event_rx));

        let transport =
            TransportHandle::spawn(connector, config.reconnect_policy(), store.clone(), event_tx);
        let poller = PollerHandle::spawn(PollerSettings::from(config), store.clone())?;

        transport.connect().await?;

        info!("feed started for {}", config.api_url);

        Ok(Self {
            store,
            transport,
            poller,
            router_task,
        })
    }

    /// Read side for presentation
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    pub fn poller(&self) -> &PollerHandle {
        &self.poller
    }

    /// Stop the poller, close the stream and stop all actors
    ///
    /// Returns what the router processed over its lifetime.
    pub async fn shutdown(self) -> Result<RouterStats> {
        debug!("shutting down feed");

        if let Err(e) = self.poller.shutdown().await {
            warn!("poller already stopped: {:#}", e);
        }
        if let Err(e) = self.transport.shutdown().await {
            warn!("transport already stopped: {:#}", e);
        }

        // The router ends once the transport dropped its event sender
        let mut router_task = self.router_task;
        let stats = match tokio::time::timeout(ROUTER_DRAIN_TIMEOUT, &mut router_task).await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                warn!("router task failed: {e}");
                RouterStats::default()
            }
            Err(_) => {
                warn!("router did not drain in time, aborting");
                router_task.abort();
                RouterStats::default()
            }
        };

        self.store.shutdown().await?;

        info!(
            "feed stopped ({} events routed, {} discarded)",
            stats.routed, stats.discarded
        );

        Ok(stats)
    }
}
