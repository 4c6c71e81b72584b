//! Error types for workers.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a task body.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task ran and failed.
    #[error("task failed: {0}")]
    Failed(String),

    /// The task stopped because shutdown was requested.
    #[error("task cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid worker configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An enabled worker has no lock key.
    #[error("worker {worker}: lock_key is required when the worker is enabled")]
    MissingLockKey { worker: String },

    /// A duration setting is zero.
    #[error("worker {worker}: {field} must be greater than zero")]
    ZeroDuration { worker: String, field: &'static str },

    /// A duration setting exceeds the supported maximum.
    #[error("worker {worker}: {field} must not exceed {max:?}")]
    DurationTooLong {
        worker: String,
        field: &'static str,
        max: Duration,
    },

    /// A duration string could not be parsed.
    #[error("invalid duration '{0}', expected e.g. 300s, 5m, 250ms, 1h")]
    InvalidDuration(String),
}
