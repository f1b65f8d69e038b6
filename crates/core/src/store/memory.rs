//! In-process store backend.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{KeyValueStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    flags: HashMap<String, Instant>,
}

/// Store kept entirely in process memory.
///
/// Satisfies the atomicity contract of [`KeyValueStore`] but not durability:
/// state is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }

    fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        Ok(self.lock()?.lists.get(list).map_or(0, VecDeque::len))
    }

    fn list_push_tail(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?
            .lists
            .entry(list.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    fn list_push_head(&self, list: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?
            .lists
            .entry(list.to_string())
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }

    fn list_pop_head(&self, list: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()?
            .lists
            .get_mut(list)
            .and_then(VecDeque::pop_front))
    }

    fn list_get(&self, list: &str, index: usize) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()?
            .lists
            .get(list)
            .and_then(|items| items.get(index).cloned()))
    }

    fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?
            .hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()?
            .hashes
            .get(hash)
            .and_then(|fields| fields.get(field).cloned()))
    }

    fn hash_get_all(&self, hash: &str) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.lock()?.hashes.get(hash).cloned().unwrap_or_default())
    }

    fn set_flag(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let now = Instant::now();
        state.flags.retain(|_, expires_at| *expires_at > now);
        state.flags.insert(key.to_string(), now + ttl);
        Ok(())
    }

    fn has_flag(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .flags
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }
}
