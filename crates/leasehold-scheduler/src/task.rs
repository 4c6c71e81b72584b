//! The unit of work run by a scheduled worker.

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::TaskError;

/// Work executed while a worker holds its lease.
///
/// `shutdown` flips to `true` when the process is stopping. A long-running
/// task should watch it and return `TaskError::Cancelled` promptly; the
/// worker does not abort a running task on its own.
#[async_trait]
pub trait Task: Send + Sync {
    async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), TaskError>;
}

/// Adapts a closure returning a future into a `Task`.
pub struct FnTask<F> {
    f: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(watch::Receiver<bool>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), TaskError> {
        (self.f)(shutdown).await
    }
}
