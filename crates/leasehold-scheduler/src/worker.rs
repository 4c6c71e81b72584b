//! Scheduled worker: a tick loop guarded by a distributed lock.

use std::sync::Arc;

use leasehold_lock::{DistributedLock, LeaseStore, LockError};
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::{Task, TaskError, WorkerDescriptor};

/// What happened on one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// The worker is disabled; the store was not contacted.
    Disabled,
    /// Another instance holds the lease.
    Contended,
    /// The acquire round trip failed or timed out.
    LockFailed(LockError),
    /// Shutdown was requested before the lease was taken.
    Cancelled,
    /// The task ran under the lease and the lease was released afterwards.
    Ran {
        result: Result<(), TaskError>,
        release: Result<(), LockError>,
    },
}

impl TickOutcome {
    /// Whether the task body ran on this tick.
    pub fn ran(&self) -> bool {
        matches!(self, Self::Ran { .. })
    }
}

/// A recurring unit of work that only one instance runs per tick.
///
/// Each tick tries to take the lease with a conditional set. The winner runs
/// the task to completion, then releases. Losers skip the tick. Failures of
/// any kind are logged and the loop carries on with the next tick.
pub struct ScheduledWorker {
    descriptor: WorkerDescriptor,
    lock: DistributedLock,
    task: Arc<dyn Task>,
    reporter: Option<mpsc::UnboundedSender<(String, TickOutcome)>>,
}

impl ScheduledWorker {
    /// Create a worker. Nothing runs until `run` or `tick` is called.
    pub fn new(
        descriptor: WorkerDescriptor,
        store: Arc<dyn LeaseStore>,
        task: Arc<dyn Task>,
    ) -> Self {
        let lock = DistributedLock::new(store, descriptor.identity.clone(), descriptor.lease_ttl);
        Self {
            descriptor,
            lock,
            task,
            reporter: None,
        }
    }

    /// Send every tick's outcome, tagged with the worker name, to `reporter`.
    pub fn with_reporter(
        mut self,
        reporter: mpsc::UnboundedSender<(String, TickOutcome)>,
    ) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &WorkerDescriptor {
        &self.descriptor
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    /// Run the tick loop until shutdown is requested.
    ///
    /// The first tick fires immediately. A tick whose task overruns the
    /// interval delays the following ticks; runs of one worker never overlap.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let d = &self.descriptor;
        info!(
            worker = %d.name,
            enabled = d.enabled,
            lock_key = %d.identity.lock_key,
            holder_id = %d.identity.holder_id,
            interval_secs = d.tick_interval.as_secs_f64(),
            lease_ttl_secs = d.lease_ttl.as_secs_f64(),
            "worker started"
        );

        let mut ticker = interval(d.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => break,

                _ = ticker.tick() => {
                    let outcome = self.tick(&mut shutdown).await;
                    let cancelled = matches!(outcome, TickOutcome::Cancelled);
                    self.report(outcome);
                    if cancelled {
                        break;
                    }
                }
            }
        }

        info!(worker = %d.name, "worker stopped");
    }

    /// Evaluate one tick: acquire, run, release.
    pub async fn tick(&self, shutdown: &mut watch::Receiver<bool>) -> TickOutcome {
        let name = &self.descriptor.name;

        if !self.descriptor.enabled {
            debug!(worker = %name, "worker disabled, skipping tick");
            return TickOutcome::Disabled;
        }

        let acquired = tokio::select! {
            biased;

            _ = shutdown_requested(shutdown) => return TickOutcome::Cancelled,

            result = self.lock.acquire(self.descriptor.acquire_timeout) => result,
        };

        match acquired {
            Ok(true) => {}
            Ok(false) => {
                debug!(worker = %name, "lease held elsewhere, skipping tick");
                return TickOutcome::Contended;
            }
            Err(e) => {
                warn!(worker = %name, error = %e, "failed to acquire lease, retrying next tick");
                return TickOutcome::LockFailed(e);
            }
        }

        debug!(worker = %name, "running task");
        let result = self.task.run(shutdown.clone()).await;
        match &result {
            Ok(()) => info!(worker = %name, "task completed"),
            Err(TaskError::Cancelled) => info!(worker = %name, "task cancelled"),
            Err(e) => error!(worker = %name, error = %e, "task failed"),
        }

        // Release even on shutdown so the next instance need not wait for the TTL
        let release = self.lock.release(self.descriptor.acquire_timeout).await;
        match &release {
            Ok(()) => {}
            Err(e) if e.is_lost_lease() => {
                warn!(worker = %name, error = %e, "lease was lost before release");
            }
            Err(e) => {
                warn!(worker = %name, error = %e, "failed to release lease, it will expire");
            }
        }

        TickOutcome::Ran { result, release }
    }

    fn report(&self, outcome: TickOutcome) {
        if let Some(reporter) = &self.reporter {
            let _ = reporter.send((self.descriptor.name.clone(), outcome));
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as shutdown.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
