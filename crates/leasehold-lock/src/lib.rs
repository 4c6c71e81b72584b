//! Lease-based distributed lock for Leasehold.
//!
//! This crate provides a single logical lock shared by independent process
//! instances:
//! - A `LeaseStore` adapter over any key-value store with atomic
//!   set-if-absent, get, delete and compare-and-delete
//! - A `DistributedLock` that acquires by conditional set and releases only
//!   while it still owns the key
//! - TTL expiry in the store as the sole recovery path for crashed holders
//!
//! Backends:
//! - **Memory**: `DashMap` based, always available (tests, single host)
//! - **Redis**: `SET NX PX` plus a Lua compare-and-delete (feature: `redis-backend`)

mod error;
mod lock;
mod memory;
mod store;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use error::{LockError, StoreError};
pub use lock::{DistributedLock, HolderId, LockIdentity};
pub use memory::MemoryLeaseStore;
pub use store::{CompareAndDelete, LeaseStore};
