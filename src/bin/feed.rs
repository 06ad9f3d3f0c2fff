//! Headless feed client
//!
//! Connects to the hub's stream and inventory endpoints and logs a summary
//! of the dashboard state whenever it changes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use monitor_feed::{Config, ConnectionState, Dashboard};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable consulted for the API token
const TOKEN_ENV: &str = "GUARDIA_API_TOKEN";

/// Minimum delay between two summaries
const SUMMARY_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "monitor-feed")]
#[command(about = "Live feed client for the monitoring hub", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API server URL (overrides config file)
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// API authentication token (overrides config file and environment)
    #[arg(short, long, value_name = "TOKEN")]
    token: Option<String>,

    /// Log at trace level
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![("monitor_feed", level), ("feed", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = Config::load(args.config.as_deref())?;
    let config = Config {
        api_url: args.url.unwrap_or(config.api_url),
        api_token: args
            .token
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .or(config.api_token),
        ..config
    };

    let dashboard = Dashboard::start(&config).await?;
    watch_feed(&dashboard).await;

    let stats = dashboard.shutdown().await?;
    debug!("router stats: {stats:?}");

    Ok(())
}

/// Log state changes until interrupted
async fn watch_feed(dashboard: &Dashboard) {
    let mut revision = dashboard.store().subscribe();
    let mut connection = dashboard.transport().subscribe();
    let mut last_summary: Option<tokio::time::Instant> = None;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("interrupted, shutting down");
                return;
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    warn!("transport stopped");
                    return;
                }
                let state = *connection.borrow_and_update();
                info!("connection {state}");
                if state == ConnectionState::Exhausted {
                    warn!("giving up on the stream, inventory polling continues");
                }
            }
            changed = revision.changed() => {
                if changed.is_err() {
                    warn!("store stopped");
                    return;
                }
                revision.borrow_and_update();
                if last_summary.is_some_and(|at| at.elapsed() < SUMMARY_INTERVAL) {
                    continue;
                }
                last_summary = Some(tokio::time::Instant::now());
                log_summary(dashboard).await;
            }
        }
    }
}

async fn log_summary(dashboard: &Dashboard) {
    let stats = match dashboard.store().stats().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!("failed to read store stats: {:#}", e);
            return;
        }
    };

    info!(
        "servers={} services={} entities={} points={} alerts={} revision={}",
        stats.servers, stats.services, stats.entities, stats.points, stats.alerts, stats.revision
    );

    let poll = dashboard.poller().status();
    if let Some(e) = &poll.servers_error {
        warn!("server inventory stale: {e}");
    }
    if let Some(e) = &poll.services_error {
        warn!("service inventory stale: {e}");
    }
}
