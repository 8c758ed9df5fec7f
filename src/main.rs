//! WorldVault - Main entry point
//!
//! Standalone backup daemon for a game server directory tree.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use worldvault::event::{EventBus, JobEvent};
use worldvault::host::StandaloneHost;
use worldvault::orchestrator::Orchestrator;
use worldvault::retention::parse_limit;
use worldvault::schedule::{parse_interval, Scheduler};
use worldvault::{utils, Config};

const DEFAULT_INTERVAL: &str = "15m";
const DEFAULT_MAX_BACKUPS: &str = "25";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run one backup immediately and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = args.config {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting worldvault v{} (server root: {})",
        env!("CARGO_PKG_VERSION"),
        config.server.root.display()
    );

    let (spec, warning) = parse_interval(&config.schedule.interval, DEFAULT_INTERVAL);
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }
    let (policy, warning) = parse_limit(&config.retention.max_backups, DEFAULT_MAX_BACKUPS);
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }

    let host = Arc::new(StandaloneHost::new(
        &config.server.root,
        &config.server.world_container,
    ));
    let events = EventBus::new();

    // Log every job lifecycle event at one place
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            match event {
                JobEvent::Started { job_id } => tracing::info!(job = %job_id, "Backup started"),
                JobEvent::Finished { job_id, artifacts } => {
                    tracing::info!(job = %job_id, count = artifacts.len(), "Backup finished")
                }
                JobEvent::Failed { job_id, reason } => {
                    tracing::error!(job = %job_id, reason, "Backup failed")
                }
            }
        }
    });

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(config.clone()),
        Arc::clone(&host) as _,
        host as _,
        events,
        policy,
    ));

    if args.once {
        let job = orchestrator.trigger_manual_backup().await?;
        tracing::info!(job = %job, "Backup complete");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(
        Arc::clone(&orchestrator),
        spec,
        config.schedule.no_repeat,
        shutdown.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
    let _ = scheduler_handle.await;
    tracing::info!("worldvault stopped");

    Ok(())
}
