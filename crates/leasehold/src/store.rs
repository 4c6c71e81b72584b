//! Lease store selection.

use std::sync::Arc;

use clap::{Args, ValueEnum};
use miette::Result;
use tracing::warn;

use leasehold_lock::{LeaseStore, MemoryLeaseStore};

/// Which lease store backs the locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// In-process store; only useful for a single instance or local testing.
    Memory,
    /// Shared Redis server.
    Redis,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Lease store backend
    #[arg(long, global = true, env = "LEASEHOLD_STORE", value_enum, default_value_t = StoreKind::Memory)]
    pub store: StoreKind,

    /// Redis host
    #[arg(long, global = true, env = "REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    /// Redis port
    #[arg(long, global = true, env = "REDIS_PORT", default_value = "6379")]
    pub redis_port: u16,

    /// Redis password
    #[arg(long, global = true, env = "REDIS_PASSWORD", default_value = "", hide_env_values = true)]
    pub redis_password: String,

    /// Redis database index
    #[arg(long, global = true, env = "REDIS_DB", default_value = "0")]
    pub redis_db: i64,
}

/// Open the configured store.
pub async fn connect(args: &StoreArgs) -> Result<Arc<dyn LeaseStore>> {
    match args.store {
        StoreKind::Memory => {
            warn!("using the in-memory lease store: locks are not shared with other processes");
            Ok(Arc::new(MemoryLeaseStore::new()))
        }
        StoreKind::Redis => connect_redis(args).await,
    }
}

/// Open a store shared with other processes.
///
/// Operator commands inspect leases held by other instances, which an
/// in-process store can never see.
pub async fn connect_shared(args: &StoreArgs) -> Result<Arc<dyn LeaseStore>> {
    require_shared(args)?;
    connect(args).await
}

fn require_shared(args: &StoreArgs) -> Result<()> {
    match args.store {
        StoreKind::Memory => Err(miette::miette!(
            help = "pass --store redis (or set LEASEHOLD_STORE=redis)",
            "the in-memory store is private to this process and holds no leases"
        )),
        StoreKind::Redis => Ok(()),
    }
}

#[cfg(feature = "redis-backend")]
async fn connect_redis(args: &StoreArgs) -> Result<Arc<dyn LeaseStore>> {
    use leasehold_lock::redis::{RedisConfig, RedisLeaseStore};
    use tracing::info;

    let config = RedisConfig {
        host: args.redis_host.clone(),
        port: args.redis_port,
        password: args.redis_password.clone(),
        database: args.redis_db,
    };
    let store = RedisLeaseStore::connect(&config)
        .await
        .map_err(|e| miette::miette!("failed to connect to Redis: {}", e))?;
    info!("using the Redis lease store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_redis(args: &StoreArgs) -> Result<Arc<dyn LeaseStore>> {
    Err(miette::miette!(
        "cannot use Redis at {}:{}: leasehold was built without the redis-backend feature",
        args.redis_host,
        args.redis_port
    ))
}
