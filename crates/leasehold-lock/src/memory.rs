//! In-memory lease store.
//!
//! Expiry is measured on the tokio clock, so tests running with paused time
//! can step a lease past its TTL with `tokio::time::advance`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use crate::{CompareAndDelete, LeaseStore, StoreError};

/// A stored lease value.
#[derive(Debug, Clone)]
struct LeaseEntry {
    value: String,
    expires_at: Instant,
}

impl LeaseEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `DashMap` backed lease store.
///
/// Each operation runs under the shard lock of its key, which makes
/// conditional set and compare-and-delete atomic. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryLeaseStore {
    entries: Arc<DashMap<String, LeaseEntry>>,
}

impl MemoryLeaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(count = removed, "purged expired leases");
        }
        removed
    }

    /// Number of entries currently stored, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or(StoreError::InvalidTtl(ttl))?;
        let lease = LeaseEntry {
            value: value.to_string(),
            expires_at,
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(lease);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(now) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn delete_if_equals(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<CompareAndDelete, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    Ok(CompareAndDelete::Absent)
                } else if occupied.get().value == expected {
                    occupied.remove();
                    Ok(CompareAndDelete::Deleted)
                } else {
                    Ok(CompareAndDelete::Mismatch {
                        current: occupied.get().value.clone(),
                    })
                }
            }
            Entry::Vacant(_) => Ok(CompareAndDelete::Absent),
        }
    }
}
