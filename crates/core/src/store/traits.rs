use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure (I/O, SQL, Redis, poisoned lock).
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Atomic primitives of a shared, crash-surviving store.
///
/// Lists are ordered from head (next to be popped) to tail. Hashes are
/// string→string maps. Flags are keys with an expiry and no value.
///
/// Implementations must be safe for concurrent readers alongside a single
/// writer; callers do not add their own locking.
pub trait KeyValueStore: Send + Sync {
    /// Backend name for logging and health output.
    fn backend_name(&self) -> &'static str;

    /// Cheap connectivity check.
    fn ping(&self) -> Result<(), StoreError>;

    /// Number of items in a list (0 if absent).
    fn list_len(&self, list: &str) -> Result<usize, StoreError>;

    /// Append at the tail; popped after everything already present.
    fn list_push_tail(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Insert at the head; popped next.
    fn list_push_head(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Remove and return the head.
    fn list_pop_head(&self, list: &str) -> Result<Option<String>, StoreError>;

    /// Read the item at `index` counted from the head, without removing it.
    fn list_get(&self, list: &str, index: usize) -> Result<Option<String>, StoreError>;

    fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError>;

    fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError>;

    fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// Set a flag that disappears after `ttl`. Re-setting refreshes the expiry.
    fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Whether an unexpired flag exists.
    fn has_flag(&self, key: &str) -> Result<bool, StoreError>;
}
