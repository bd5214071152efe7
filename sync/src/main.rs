//! Taskboard Sync - headless task store watcher.
//!
//! Starts the sync service for the project described by the environment and
//! logs every read model update until interrupted.
//!
//! # Environment Variables
//!
//! See the [`config`](taskboard_sync::config) module for available options.
//! Log verbosity follows `RUST_LOG` (default `taskboard_sync=info`).

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use taskboard_store::JsonTaskRepository;
use taskboard_sync::{ReadModel, SyncConfig, SyncService};

/// Capacity of the read model update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "taskboard_sync=info,taskboard_store=info";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Taskboard Sync");

    let config = SyncConfig::from_env().context("Failed to load configuration")?;

    info!(
        project_root = %config.project_root.display(),
        tasks_path = %config.tasks_path.display(),
        backend = %config.backend,
        poll_ms = config.timings.poll_interval.as_millis(),
        "Configuration loaded"
    );

    let service = SyncService::new(config, Arc::new(JsonTaskRepository::new()));

    let (update_tx, mut update_rx) = mpsc::channel::<ReadModel>(UPDATE_CHANNEL_CAPACITY);
    service
        .start(update_tx)
        .context("Failed to start sync service")?;

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            update = update_rx.recv() => {
                let Some(model) = update else {
                    error!("Poll loop stopped unexpectedly");
                    break;
                };
                log_update(&model);
            }
        }
    }

    info!("Shutting down...");
    service.dispose();

    Ok(())
}

fn log_update(model: &ReadModel) {
    let meta = &model.metadata;
    info!(
        total = meta.total_tasks,
        pending = meta.pending_tasks,
        in_progress = meta.in_progress_tasks,
        done = meta.completed_tasks,
        "Task store updated"
    );
}

/// Initializes the tracing subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
