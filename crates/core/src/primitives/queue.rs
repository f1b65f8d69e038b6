use std::sync::Arc;

use crate::store::{KeyValueStore, StoreError};

/// A FIFO queue of serialized items stored as a list in the shared store.
///
/// Two insertion modes: append (joins the back of the line) and immediate
/// (becomes the very next item dequeued). Every operation is one or more
/// atomic store calls, so concurrent readers never observe a torn item.
pub struct DurableQueue<K> {
    store: Arc<dyn KeyValueStore>,
    name: String,
    key_of: K,
}

impl<K> DurableQueue<K>
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

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.store.list_len(&self.name)
    }

    /// Add an item. `immediate` puts it ahead of everything already queued.
    pub fn enqueue(&self, item: &str, immediate: bool) -> Result<(), StoreError> {
        if immediate {
            self.store.list_push_head(&self.name, item)
        } else {
            self.store.list_push_tail(&self.name, item)
        }
    }

    pub fn dequeue(&self) -> Result<Option<String>, StoreError> {
        self.store.list_pop_head(&self.name)
    }

    /// The item the next `dequeue` would return, left in place.
    pub fn peek(&self) -> Result<Option<String>, StoreError> {
        self.store.list_get(&self.name, 0)
    }

    /// First item whose extracted key equals `key`.
    pub fn find(&self, key: &str) -> Result<Option<String>, StoreError> {
        let len = self.len()?;
        for index in 0..len {
            match self.store.list_get(&self.name, index)? {
                Some(item) if self.matches(&item, key) => return Ok(Some(item)),
                Some(_) => {}
                // Shrunk underneath us
                None => break,
            }
        }
        Ok(None)
    }

    /// Remove the first item whose key equals `key`, keeping the relative
    /// order of the rest. Returns whether a match was removed.
    ///
    /// Items ahead of the match are drained, then pushed back to the head in
    /// reverse so they come out in their original order.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut drained = Vec::new();
        let mut deleted = false;

        while let Some(item) = self.dequeue()? {
            if self.matches(&item, key) {
                deleted = true;
                break;
            }
            drained.push(item);
        }

        for item in drained.iter().rev() {
            self.enqueue(item, true)?;
        }

        Ok(deleted)
    }

    /// Snapshot of the queue in dequeue order.
    pub fn items(&self) -> Result<Vec<String>, StoreError> {
        let len = self.len()?;
        let mut items = Vec::with_capacity(len);
        for index in 0..len {
            match self.store.list_get(&self.name, index)? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    fn matches(&self, item: &str, key: &str) -> bool {
        (self.key_of)(item).as_deref() == Some(key)
    }
}
