use std::sync::Arc;
use std::time::Duration;

use crate::store::{KeyValueStore, StoreError};

/// Per-problem `deleted` / `executed` tags with independent retention.
///
/// Tags are only consulted for de-duplication, so expiring them is safe once
/// no stale message for the problem can still be in flight.
pub struct ProblemMarkers {
    store: Arc<dyn KeyValueStore>,
    deleted_ttl: Duration,
    executed_ttl: Duration,
}

impl ProblemMarkers {
    pub fn new(store: Arc<dyn KeyValueStore>, deleted_ttl: Duration, executed_ttl: Duration) -> Self {
        Self {
            store,
            deleted_ttl,
            executed_ttl,
        }
    }

    pub fn mark_deleted(&self, problem_id: &str) -> Result<(), StoreError> {
        self.store
            .set_flag(&Self::deleted_key(problem_id), self.deleted_ttl)
    }

    pub fn is_deleted(&self, problem_id: &str) -> Result<bool, StoreError> {
        self.store.has_flag(&Self::deleted_key(problem_id))
    }

    pub fn mark_executed(&self, problem_id: &str) -> Result<(), StoreError> {
        self.store
            .set_flag(&Self::executed_key(problem_id), self.executed_ttl)
    }

    pub fn is_executed(&self, problem_id: &str) -> Result<bool, StoreError> {
        self.store.has_flag(&Self::executed_key(problem_id))
    }

    fn deleted_key(problem_id: &str) -> String {
        format!("problem:{}:deleted", problem_id)
    }

    fn executed_key(problem_id: &str) -> String {
        format!("problem:{}:executed", problem_id)
    }
}
