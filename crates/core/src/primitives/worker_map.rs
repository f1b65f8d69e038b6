use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::protocol::WorkerId;
use crate::store::{KeyValueStore, StoreError};

/// Stored value meaning "nothing here".
pub const EMPTY: &str = "";

/// One value per worker, stored as a hash with the worker id as field.
pub struct WorkerMap<K> {
    store: Arc<dyn KeyValueStore>,
    name: String,
    key_of: K,
}

impl<K> WorkerMap<K>
where
    K: Fn(&str) -> Option<String>,
{
    pub fn new(store: Arc<dyn KeyValueStore>, name: impl Into<String>, key_of: K) -> Self {
        Self {
            store,
            name: name.into(),
            key_of,
        }
    }

    pub fn update(&self, worker: WorkerId, value: &str) -> Result<(), StoreError> {
        self.store.hash_set(&self.name, &worker.to_string(), value)
    }

    pub fn clear(&self, worker: WorkerId) -> Result<(), StoreError> {
        self.update(worker, EMPTY)
    }

    /// Raw stored value, `None` if the worker has no entry yet.
    pub fn get(&self, worker: WorkerId) -> Result<Option<String>, StoreError> {
        self.store.hash_get(&self.name, &worker.to_string())
    }

    /// Stored value, treating [`EMPTY`] like a missing entry.
    pub fn occupied(&self, worker: WorkerId) -> Result<Option<String>, StoreError> {
        Ok(self.get(worker)?.filter(|value| value != EMPTY))
    }

    /// All entries, ordered by worker id. Fields that are not worker ids are
    /// skipped.
    pub fn get_all(&self) -> Result<BTreeMap<WorkerId, String>, StoreError> {
        let raw = self.store.hash_get_all(&self.name)?;
        let mut entries = BTreeMap::new();
        for (field, value) in raw {
            match field.parse::<WorkerId>() {
                Ok(worker) => {
                    entries.insert(worker, value);
                }
                Err(_) => warn!("Ignoring non-numeric worker field {:?} in {}", field, self.name),
            }
        }
        Ok(entries)
    }

    /// Whether the worker's entry has key `key`.
    pub fn is_equal(&self, worker: WorkerId, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .get(worker)?
            .and_then(|value| (self.key_of)(&value))
            .is_some_and(|current| current == key))
    }

    /// Key of the worker's entry, if any.
    pub fn key(&self, worker: WorkerId) -> Result<Option<String>, StoreError> {
        Ok(self.get(worker)?.and_then(|value| (self.key_of)(&value)))
    }
}
