//! Worker group.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::ScheduledWorker;

/// An ordered set of workers started together.
#[derive(Default)]
pub struct WorkerGroup {
    workers: Vec<ScheduledWorker>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a worker; workers start in insertion order.
    pub fn push(&mut self, worker: ScheduledWorker) {
        self.workers.push(worker);
    }

    pub fn with_worker(mut self, worker: ScheduledWorker) -> Self {
        self.push(worker);
        self
    }

    pub fn workers(&self) -> &[ScheduledWorker] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Spawn every worker's tick loop on its own task and return immediately.
    ///
    /// All workers share `shutdown`. Waiting on the returned handles is up to
    /// the caller.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(count = self.workers.len(), "starting workers");
        self.workers
            .into_iter()
            .map(|worker| tokio::spawn(worker.run(shutdown.clone())))
            .collect()
    }
}

impl FromIterator<ScheduledWorker> for WorkerGroup {
    fn from_iter<I: IntoIterator<Item = ScheduledWorker>>(iter: I) -> Self {
        Self {
            workers: iter.into_iter().collect(),
        }
    }
}
