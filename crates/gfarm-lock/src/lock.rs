//! Lease acquisition and release

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::store::LockStore;
use crate::{LockError, Result};

/// Upper bound on the sleep between acquisition attempts.
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Lease acquisition parameters.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Prefix prepended to every resource key in the store
    pub prefix: String,
    /// Lease lifetime in the store (minimum one second)
    pub ttl: Duration,
    /// Additional attempts after the first (so `retry_count + 1` total)
    pub retry_count: u32,
    /// Sleep between attempts, capped at [`MAX_RETRY_INTERVAL`]
    pub retry_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            prefix: "lock:".to_string(),
            ttl: Duration::from_secs(60),
            retry_count: 3,
            retry_interval: Duration::from_millis(200),
        }
    }
}

/// A held lease: the token is the sole proof of ownership for one
/// acquire/use/release cycle. Leases are not cached or reused.
#[derive(Debug, Clone)]
pub struct LockLease {
    key: String,
    token: String,
    ttl: Duration,
}

impl LockLease {
    /// Full store key (prefix included).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ownership token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Lease lifetime granted at acquisition.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Mutual exclusion across gateway instances sharing one store.
///
/// Acquisition retries a bounded number of times with a capped interval;
/// there is no fairness or ordering guarantee among waiters. Release is
/// best-effort: a failed release only means the lease will lapse through
/// expiry instead.
pub struct DistributedLock {
    store: Arc<dyn LockStore>,
    config: LockConfig,
}

impl DistributedLock {
    /// Create a lock over `store`.
    pub fn new(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Acquire a lease on `key`.
    ///
    /// Fails with [`LockError::Unavailable`] once the retry budget is
    /// exhausted.
    pub async fn acquire(&self, key: &str) -> Result<LockLease> {
        let token = Uuid::new_v4().to_string();
        let full_key = format!("{}{}", self.config.prefix, key);
        let ttl = self.config.ttl.max(Duration::from_secs(1));
        let interval = self.config.retry_interval.min(MAX_RETRY_INTERVAL);
        let attempts = self.config.retry_count + 1;

        for attempt in 1..=attempts {
            if self.store.put_if_absent(&full_key, &token, ttl).await? {
                trace!(key, attempt, "lease acquired");
                return Ok(LockLease {
                    key: full_key,
                    token,
                    ttl,
                });
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(LockError::unavailable(key, attempts))
    }

    /// Release a lease.
    ///
    /// Returns false when the lease was not released — already expired,
    /// re-acquired by another holder, or the store was unreachable. Callers
    /// must not treat that as fatal: expiry is the backstop.
    pub async fn release(&self, lease: &LockLease) -> bool {
        match self.store.delete_if_match(lease.key(), lease.token()).await {
            Ok(true) => {
                trace!(key = lease.key(), "lease released");
                true
            }
            Ok(false) => {
                debug!(key = lease.key(), "lease already expired or re-acquired");
                false
            }
            Err(e) => {
                warn!(key = lease.key(), "lease release failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLockStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> LockConfig {
        LockConfig {
            retry_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    /// Store wrapper that counts acquisition attempts.
    struct CountingStore {
        inner: MemoryLockStore,
        puts: AtomicU32,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryLockStore::new(),
                puts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LockStore for CountingStore {
        async fn put_if_absent(&self, key: &str, token: &str, ttl: Duration) -> crate::Result<bool> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put_if_absent(key, token, ttl).await
        }

        async fn delete_if_match(&self, key: &str, token: &str) -> crate::Result<bool> {
            self.inner.delete_if_match(key, token).await
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let lock = DistributedLock::new(Arc::new(MemoryLockStore::new()), fast_config());
        let lease = lock.acquire("res").await.unwrap();
        assert_eq!(lease.key(), "lock:res");
        assert!(!lease.token().is_empty());
        assert!(lock.release(&lease).await);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_exactly_one_winner() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            retry_count: 0,
            ..fast_config()
        };

        let lock_a = DistributedLock::new(store.clone(), config.clone());
        let lock_b = DistributedLock::new(store, config);

        let (a, b) = tokio::join!(lock_a.acquire("shared"), lock_b.acquire("shared"));
        assert_ne!(a.is_ok(), b.is_ok(), "exactly one acquire must win");
    }

    #[tokio::test]
    async fn test_exhausted_retry_budget_counts_attempts() {
        let store = Arc::new(CountingStore::new());
        let config = LockConfig {
            retry_count: 3,
            ttl: Duration::from_secs(10),
            ..fast_config()
        };
        let lock = DistributedLock::new(store.clone(), config);

        let holder = lock.acquire("a").await.unwrap();
        store.puts.store(0, Ordering::SeqCst);

        let err = lock.acquire("a").await.unwrap_err();
        match err {
            LockError::Unavailable { key, attempts } => {
                assert_eq!(key, "a");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.puts.load(Ordering::SeqCst), 4);

        assert!(lock.release(&holder).await);
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_keeps_lease() {
        let store = Arc::new(MemoryLockStore::new());
        let lock = DistributedLock::new(store.clone(), fast_config());

        let lease = lock.acquire("res").await.unwrap();
        let forged = LockLease {
            key: lease.key().to_string(),
            token: "someone-else".to_string(),
            ttl: lease.ttl(),
        };

        assert!(!lock.release(&forged).await);
        // The rightful holder can still release.
        assert!(lock.release(&lease).await);
    }

    #[tokio::test]
    async fn test_expiry_frees_the_key() {
        let store = Arc::new(MemoryLockStore::new());
        let config = LockConfig {
            ttl: Duration::from_secs(1),
            retry_count: 0,
            ..fast_config()
        };
        let lock = DistributedLock::new(store.clone(), config);

        let lease = lock.acquire("res").await.unwrap();
        // Simulate expiry in the store rather than waiting out the minimum
        // TTL: a new holder then wins and the stale release is a no-op.
        assert!(store
            .delete_if_match(lease.key(), lease.token())
            .await
            .unwrap());
        let second = lock.acquire("res").await.unwrap();
        assert!(!lock.release(&lease).await);
        assert!(lock.release(&second).await);
    }

    #[tokio::test]
    async fn test_tokens_are_fresh_per_acquisition() {
        let lock = DistributedLock::new(Arc::new(MemoryLockStore::new()), fast_config());
        let first = lock.acquire("res").await.unwrap();
        lock.release(&first).await;
        let second = lock.acquire("res").await.unwrap();
        assert_ne!(first.token(), second.token());
    }
}
