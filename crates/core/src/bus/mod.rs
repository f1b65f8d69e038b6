//! Topic-based message bus with consumer groups and commit-after-handle.
//!
//! Delivery is at-least-once: a consumer sees every message of its topic from
//! the group's last committed offset onward, and anything polled but not
//! committed is delivered again after [`BusConsumer::rewind`] or a restart.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryBus;
pub use sqlite::SqliteBus;
pub use traits::{publish_json, BusConsumer, BusError, BusMessage, MessageBus};

use std::sync::Arc;

use crate::config::{BusBackend, BusConfig};

/// Open the bus selected by config.
pub fn open_bus(config: &BusConfig) -> Result<Arc<dyn MessageBus>, BusError> {
    match config.backend {
        BusBackend::Sqlite => Ok(Arc::new(SqliteBus::new(&config.path)?)),
        BusBackend::Memory => Ok(Arc::new(MemoryBus::new())),
    }
}
