//! Error types for lease stores and the distributed lock.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a lease store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("lease store unavailable: {0}")]
    Unavailable(String),

    /// The TTL cannot be represented as an expiry time.
    #[error("lease TTL {0:?} is out of range")]
    InvalidTtl(Duration),

    /// Redis error.
    #[cfg(feature = "redis-backend")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Errors that can occur in lock operations.
///
/// Contention is not an error: `acquire` reports it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum LockError {
    /// Store round trip failed.
    #[error("{key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Store round trip did not finish before the deadline.
    #[error("{key}: lease store did not answer within {deadline:?}")]
    Timeout { key: String, deadline: Duration },

    /// The key is held by a different holder.
    #[error("{key}: wrong lease owner (held by {current}, not {holder})")]
    OwnershipMismatch {
        key: String,
        holder: String,
        current: String,
    },

    /// The key no longer exists (expired or already released).
    #[error("{key}: lease not held")]
    NotHeld { key: String },
}

impl LockError {
    /// True when the lease has already passed out of this holder's hands.
    ///
    /// Another instance may be legitimately running, so callers log these
    /// and carry on.
    pub fn is_lost_lease(&self) -> bool {
        matches!(self, Self::OwnershipMismatch { .. } | Self::NotHeld { .. })
    }
}
