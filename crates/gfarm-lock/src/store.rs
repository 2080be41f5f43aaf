//! Atomic store seam and the in-process implementation

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Result;

/// Atomic primitives the shared key-value store must provide.
///
/// These two operations are the only permitted access pattern to the lock
/// keyspace; anything richer would break the mutual-exclusion invariant
/// across gateway instances. Implementations must make each call atomic
/// with respect to concurrent callers.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Store `token` under `key` with `ttl`, only if `key` is absent.
    /// Returns true when the value was stored.
    async fn put_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if its current value equals `token`, in a single
    /// round trip. Returns true when the key was deleted.
    async fn delete_if_match(&self, key: &str, token: &str) -> Result<bool>;
}

struct StoredLease {
    token: String,
    expires_at: Instant,
}

impl StoredLease {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process [`LockStore`] with TTL expiry.
///
/// Useful for tests and single-instance deployments; it provides the same
/// atomicity contract within one process that Redis provides across
/// processes.
#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, StoredLease>>,
}

impl MemoryLockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn put_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            StoredLease {
                token: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_match(&self, key: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(existing) if existing.is_expired() => {
                // Logically absent; reclaim the slot.
                entries.remove(key);
                Ok(false)
            }
            Some(existing) if existing.token == token => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
