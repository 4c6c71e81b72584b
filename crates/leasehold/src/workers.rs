//! Worker definitions from flags, environment or a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args};
use serde::Deserialize;
use thiserror::Error;

use leasehold_scheduler::{WorkerConfig, parse_duration};

use crate::parse_bool_env;

/// Errors loading worker definitions.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The worker file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker file is not valid JSON for a worker list.
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No command to run.
    #[error("worker {0}: no command given (use --command or WORKER_COMMAND)")]
    MissingCommand(String),

    /// The file defines no workers.
    #[error("{0}: no workers defined")]
    Empty(PathBuf),
}

/// A worker and the command it runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerSpec {
    #[serde(flatten)]
    pub config: WorkerConfig,
    pub command: String,
}

/// Contents of a `--config` file.
#[derive(Debug, Deserialize)]
struct WorkersFile {
    workers: Vec<WorkerSpec>,
}

/// Settings for a single worker given on the command line.
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// JSON file with a `workers` list; replaces the single-worker flags
    #[arg(long, env = "LEASEHOLD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Holder id for this instance (random if unset)
    #[arg(long, env = "WORKER_UNIQUE_ID")]
    pub holder_id: Option<String>,

    /// Worker name used in logs
    #[arg(long, env = "WORKER_NAME", default_value = "")]
    pub name: String,

    /// Enable the worker
    #[arg(
        long,
        env = "WORKER_ENABLED",
        action = ArgAction::Set,
        value_parser = parse_bool_env,
        default_value = "false"
    )]
    pub enabled: bool,

    /// Lock key shared by all instances running this worker
    #[arg(long, env = "WORKER_LOCK_KEY", default_value = "")]
    pub lock_key: String,

    /// Time between ticks
    #[arg(long, env = "WORKER_INTERVAL", default_value = "300s", value_parser = parse_duration)]
    pub interval: Duration,

    /// Lease auto-release timeout; keep it above the command's run time
    #[arg(long, env = "WORKER_RELEASE_TTL", default_value = "200s", value_parser = parse_duration)]
    pub release_ttl: Duration,

    /// Bound on the lock round trip
    #[arg(long, env = "WORKER_LOCK_TIMEOUT", default_value = "3s", value_parser = parse_duration)]
    pub lock_timeout: Duration,

    /// Shell command to run under the lease
    #[arg(long, env = "WORKER_COMMAND")]
    pub command: Option<String>,
}

impl WorkerArgs {
    /// Build the worker list, from the config file if one was given.
    pub async fn load(&self) -> Result<Vec<WorkerSpec>, LoadError> {
        match &self.config {
            Some(path) => load_file(path).await,
            None => self.single().map(|spec| vec![spec]),
        }
    }

    fn single(&self) -> Result<WorkerSpec, LoadError> {
        let config = WorkerConfig {
            name: self.name.clone(),
            enabled: self.enabled,
            lock_key: self.lock_key.clone(),
            holder_id: self.holder_id.clone(),
            tick_interval: self.interval,
            lease_ttl: self.release_ttl,
            acquire_timeout: self.lock_timeout,
        };
        let command = self
            .command
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LoadError::MissingCommand(config.display_name()))?;
        Ok(WorkerSpec { config, command })
    }
}

async fn load_file(path: &Path) -> Result<Vec<WorkerSpec>, LoadError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_workers(path, &text)
}

fn parse_workers(path: &Path, text: &str) -> Result<Vec<WorkerSpec>, LoadError> {
    let file: WorkersFile = serde_json::from_str(text).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if file.workers.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    if let Some(spec) = file.workers.iter().find(|s| s.command.trim().is_empty()) {
        return Err(LoadError::MissingCommand(spec.config.display_name()));
    }
    Ok(file.workers)
}
