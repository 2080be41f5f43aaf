//! Store-backed distributed lease for gateway instances
//!
//! This crate provides:
//! - [`LockStore`]: the atomic seam to the shared key-value store
//!   (set-if-absent-with-expiry, compare-and-delete)
//! - [`RedisLockStore`]: Redis implementation (`SET NX EX` acquire, Lua
//!   script release in a single round trip)
//! - [`MemoryLockStore`]: in-process implementation for tests and
//!   single-instance deployments
//! - [`DistributedLock`]: bounded-retry acquisition and best-effort,
//!   token-checked release of a [`LockLease`]
//!
//! The design trades strict real-time exclusivity for liveness: a holder
//! paused past its TTL loses the lease silently, and a crashed holder can
//! never deadlock the cluster because expiry is the backstop.

pub mod lock;
pub mod redis_store;
pub mod store;

pub use lock::{DistributedLock, LockConfig, LockLease, MAX_RETRY_INTERVAL};
pub use redis_store::RedisLockStore;
pub use store::{LockStore, MemoryLockStore};

use thiserror::Error;

/// Lock operation error types
#[derive(Debug, Error)]
pub enum LockError {
    /// Retry budget exhausted without winning the lease
    #[error("lock unavailable for '{key}' after {attempts} attempts")]
    Unavailable {
        /// Resource key (without the store prefix)
        key: String,
        /// Attempts made (`retry_count + 1`)
        attempts: u32,
    },

    /// Store transport or protocol failure
    #[error("lock store error: {message}")]
    Store {
        /// Description of the failure
        message: String,
        /// Underlying error, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LockError {
    /// Create an exhausted-retry error.
    pub fn unavailable(key: impl Into<String>, attempts: u32) -> Self {
        Self::Unavailable {
            key: key.into(),
            attempts,
        }
    }

    /// Create a store error with a source.
    pub fn store(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        Self::store("redis operation failed", err)
    }
}

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;
