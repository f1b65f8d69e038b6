//! Durable key/value substrate for the orchestrator's crash-recoverable state.
//!
//! The orchestrator never holds authoritative state in memory; everything it
//! knows about the backlog and the worker pool lives behind [`KeyValueStore`].
//! Each trait method maps to a single atomic operation of the backend.

mod memory;
mod redis;
mod sqlite;
mod traits;

pub use self::redis::RedisStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, StoreError};

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};

/// Open the store selected by config.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    match config.backend {
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::new(&config.path)?)),
        StoreBackend::Redis => Ok(Arc::new(RedisStore::new(&config.url)?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
