//! Leasehold: run a recurring command on exactly one of many instances.
//!
//! Main binary with subcommands:
//! - `run`: start the lease-guarded workers and run until Ctrl-C/SIGTERM
//! - `holder`: print the instance currently holding a lock key
//! - `release`: release a lock key on behalf of a known holder

use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leasehold_lock::{DistributedLock, HolderId, LockIdentity};
use leasehold_scheduler::parse_duration;

mod command;
mod run;
mod store;
mod workers;

use store::StoreArgs;
use workers::WorkerArgs;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "leasehold")]
#[command(about = "Run a recurring command on exactly one of many instances", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run lease-guarded workers until interrupted
    Run {
        #[command(flatten)]
        worker: WorkerArgs,

        /// How long to wait for running tasks after a shutdown signal
        #[arg(long, env = "LEASEHOLD_SHUTDOWN_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
        shutdown_timeout: Duration,
    },

    /// Print the holder of a lock key (needs a shared store)
    Holder {
        /// Lock key to inspect
        #[arg(long, env = "WORKER_LOCK_KEY")]
        lock_key: String,

        /// Store round-trip timeout
        #[arg(long, default_value = "3s", value_parser = parse_duration)]
        timeout: Duration,
    },

    /// Release a lock key if it is held by the given holder (needs a shared store)
    Release {
        /// Lock key to release
        #[arg(long, env = "WORKER_LOCK_KEY")]
        lock_key: String,

        /// Holder id the lease must belong to
        #[arg(long, env = "WORKER_UNIQUE_ID")]
        holder_id: String,

        /// Store round-trip timeout
        #[arg(long, default_value = "3s", value_parser = parse_duration)]
        timeout: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "leasehold=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            worker,
            shutdown_timeout,
        } => run::run(&cli.store, &worker, shutdown_timeout).await,

        Commands::Holder { lock_key, timeout } => {
            let store = store::connect_shared(&cli.store).await?;
            // The holder id is irrelevant for a read
            let lock = DistributedLock::new(
                store,
                LockIdentity::new(lock_key.as_str(), HolderId::new("")),
                Duration::ZERO,
            );
            match lock
                .holder(timeout)
                .await
                .map_err(|e| miette::miette!("{}", e))?
            {
                Some(holder) => println!("{lock_key}: held by {holder}"),
                None => println!("{lock_key}: free"),
            }
            Ok(())
        }

        Commands::Release {
            lock_key,
            holder_id,
            timeout,
        } => {
            let store = store::connect_shared(&cli.store).await?;
            let lock = DistributedLock::new(
                store,
                LockIdentity::new(lock_key.as_str(), HolderId::new(holder_id)),
                Duration::ZERO,
            );
            lock.release(timeout)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("{lock_key}: released");
            Ok(())
        }
    }
}
