//! Lease store adapter.

use std::time::Duration;

use async_trait::async_trait;

use crate::StoreError;

/// Result of an atomic compare-and-delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompareAndDelete {
    /// The stored value matched and the key was removed.
    Deleted,
    /// The key exists with a different value; nothing was changed.
    Mismatch { current: String },
    /// The key does not exist.
    Absent,
}

/// A key-value store able to hold leases.
///
/// Implementations must be safe to share between tasks without extra
/// locking; every method is a single atomic store operation.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Write `value` at `key` with a TTL, only if `key` is currently absent.
    ///
    /// Returns `true` iff the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Read the live value at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove `key` unconditionally, returning the number of keys removed.
    async fn delete(&self, key: &str) -> Result<u64, StoreError>;

    /// Remove `key` only if it currently holds `expected`, in one step.
    async fn delete_if_equals(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<CompareAndDelete, StoreError>;
}
