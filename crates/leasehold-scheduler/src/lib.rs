//! Lease-guarded recurring workers for Leasehold.
//!
//! This crate provides:
//! - `WorkerConfig`: per-worker settings with defaults and validation
//! - `Task`: the unit of work a worker runs, returning an explicit result
//! - `ScheduledWorker`: a tick loop that runs its task only while holding
//!   the worker's distributed lock
//! - `WorkerGroup`: starts a set of workers as independent tokio tasks

mod config;
mod error;
mod group;
mod task;
mod worker;

pub use config::{MAX_DURATION, WorkerConfig, WorkerDescriptor, parse_duration};
pub use error::{ConfigError, TaskError};
pub use group::WorkerGroup;
pub use task::{FnTask, Task};
pub use worker::{ScheduledWorker, TickOutcome};
