//! Shell command task.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

use leasehold_scheduler::{Task, TaskError};

/// Runs a command through `sh -c`. A non-zero exit is a task failure.
///
/// On shutdown the child is killed and the task reports `Cancelled`.
pub struct CommandTask {
    command: String,
}

impl CommandTask {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Task for CommandTask {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), TaskError> {
        debug!(command = %self.command, "spawning command");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(TaskError::Failed(format!("`{}` exited with {}", self.command, status)))
                }
            }

            _ = shutdown_requested(&mut shutdown) => {
                warn!(command = %self.command, "killing command on shutdown");
                child.kill().await?;
                Err(TaskError::Cancelled)
            }
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
