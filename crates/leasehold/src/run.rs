//! `run` command: start the workers and supervise shutdown.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use leasehold_lock::{HolderId, LeaseStore};
use leasehold_scheduler::{ScheduledWorker, Task, WorkerGroup};

use crate::command::CommandTask;
use crate::store::{self, StoreArgs};
use crate::workers::{WorkerArgs, WorkerSpec};

/// Run the configured workers until a shutdown signal arrives.
pub async fn run(
    store_args: &StoreArgs,
    worker_args: &WorkerArgs,
    grace: Duration,
) -> Result<()> {
    let specs = worker_args
        .load()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    // One id for this process unless a worker configures its own
    let instance_id = match worker_args.holder_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => HolderId::new(id),
        None => {
            let id = HolderId::generate();
            info!(holder_id = %id, "generated holder id for this instance");
            id
        }
    };

    let store = store::connect(store_args).await?;
    let group = build_group(specs, &store, &instance_id)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    let handles = group.start(shutdown_rx.clone());

    let mut shutdown_rx = shutdown_rx;
    let _ = shutdown_rx.wait_for(|stop| *stop).await;

    drain(handles, grace).await;
    info!("leasehold shut down");
    Ok(())
}

/// Turn worker specs into a group sharing `store`.
fn build_group(
    specs: Vec<WorkerSpec>,
    store: &Arc<dyn LeaseStore>,
    instance_id: &HolderId,
) -> Result<WorkerGroup> {
    let mut group = WorkerGroup::new();
    for spec in specs {
        let descriptor = spec
            .config
            .into_descriptor(|| instance_id.clone())
            .map_err(|e| miette::miette!("{}", e))?;
        if !descriptor.enabled {
            warn!(worker = %descriptor.name, "worker is disabled and will never run");
        }
        let task: Arc<dyn Task> = Arc::new(CommandTask::new(spec.command));
        group.push(ScheduledWorker::new(descriptor, Arc::clone(store), task));
    }
    Ok(group)
}

/// Wait up to `grace` for the workers to finish their current tick.
async fn drain(handles: Vec<JoinHandle<()>>, grace: Duration) {
    let wait_all = async {
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
    };

    if tokio::time::timeout(grace, wait_all).await.is_err() {
        warn!(
            grace_secs = grace.as_secs_f64(),
            "workers still running after grace period, exiting anyway"
        );
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
