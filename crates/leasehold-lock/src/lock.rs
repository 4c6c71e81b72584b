//! Distributed lock built on a lease store.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::{CompareAndDelete, LeaseStore, LockError, StoreError};

/// Identifier of one process instance competing for a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderId(String);

impl HolderId {
    /// Wrap an explicitly configured holder id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random holder id (UUID v4).
    ///
    /// This is the runtime default for instances started without a
    /// configured id. Nothing in this crate calls it implicitly.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The contended key together with the instance claiming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockIdentity {
    /// Key shared by every instance competing for the same task.
    pub lock_key: String,
    /// Value written at `lock_key` while this instance holds the lease.
    pub holder_id: HolderId,
}

impl LockIdentity {
    pub fn new(lock_key: impl Into<String>, holder_id: HolderId) -> Self {
        Self {
            lock_key: lock_key.into(),
            holder_id,
        }
    }
}

/// A single logical lock shared across process instances.
///
/// The lease written by `acquire` expires after `ttl` in the store. There is
/// no renewal, so work done under the lock must finish well inside the TTL
/// or the lease can be taken by another holder mid-task.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LeaseStore>,
    identity: LockIdentity,
    ttl: Duration,
}

impl fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("identity", &self.identity)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl DistributedLock {
    /// Create a lock handle. No store call is made.
    pub fn new(store: Arc<dyn LeaseStore>, identity: LockIdentity, ttl: Duration) -> Self {
        Self {
            store,
            identity,
            ttl,
        }
    }

    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    pub fn key(&self) -> &str {
        &self.identity.lock_key
    }

    pub fn holder_id(&self) -> &HolderId {
        &self.identity.holder_id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lease with one conditional set, bounded by `deadline`.
    ///
    /// Returns `Ok(false)` when another holder owns the key. That is the
    /// normal contention outcome, not an error.
    #[tracing::instrument(skip(self), fields(lock_key = %self.identity.lock_key, holder_id = %self.identity.holder_id))]
    pub async fn acquire(&self, deadline: Duration) -> Result<bool, LockError> {
        let acquired = self
            .bounded(
                deadline,
                self.store.set_if_absent(
                    &self.identity.lock_key,
                    self.identity.holder_id.as_str(),
                    self.ttl,
                ),
            )
            .await?;

        if acquired {
            info!(ttl_secs = self.ttl.as_secs_f64(), "lease acquired");
        } else {
            debug!("lease held by another instance");
        }
        Ok(acquired)
    }

    /// Give the lease back if this instance still owns it.
    ///
    /// The ownership check and the delete are one atomic store operation, so
    /// a lease that expired and was re-acquired elsewhere is never removed.
    /// Returns `OwnershipMismatch` if another holder owns the key and
    /// `NotHeld` if the key is gone; both leave the store unchanged.
    #[tracing::instrument(skip(self), fields(lock_key = %self.identity.lock_key, holder_id = %self.identity.holder_id))]
    pub async fn release(&self, deadline: Duration) -> Result<(), LockError> {
        let outcome = self
            .bounded(
                deadline,
                self.store
                    .delete_if_equals(&self.identity.lock_key, self.identity.holder_id.as_str()),
            )
            .await?;

        match outcome {
            CompareAndDelete::Deleted => {
                info!("lease released");
                Ok(())
            }
            CompareAndDelete::Mismatch { current } => Err(LockError::OwnershipMismatch {
                key: self.identity.lock_key.clone(),
                holder: self.identity.holder_id.to_string(),
                current,
            }),
            CompareAndDelete::Absent => Err(LockError::NotHeld {
                key: self.identity.lock_key.clone(),
            }),
        }
    }

    /// Read the holder currently stored at the lock key.
    pub async fn holder(&self, deadline: Duration) -> Result<Option<String>, LockError> {
        self.bounded(deadline, self.store.get(&self.identity.lock_key))
            .await
    }

    async fn bounded<T>(
        &self,
        deadline: Duration,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, LockError> {
        match tokio::time::timeout(deadline, op).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(LockError::Store {
                key: self.identity.lock_key.clone(),
                source,
            }),
            Err(_) => Err(LockError::Timeout {
                key: self.identity.lock_key.clone(),
                deadline,
            }),
        }
    }
}
