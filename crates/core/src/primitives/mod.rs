//! Typed containers over the [`KeyValueStore`](crate::store::KeyValueStore).
//!
//! The containers are generic over a key-extraction function applied to the
//! stored payload. The orchestrator uses three instantiations, all keyed by
//! problem id: the backlog, the pending-request map and the status map.

mod markers;
mod queue;
mod worker_map;

pub use markers::ProblemMarkers;
pub use queue::DurableQueue;
pub use worker_map::{WorkerMap, EMPTY};

use std::sync::Arc;

use crate::protocol::ProblemSubmission;
use crate::store::KeyValueStore;

/// Extracts the comparison key from a stored payload.
pub type KeyFn = fn(&str) -> Option<String>;

/// Store name of the backlog list.
pub const BACKLOG_KEY: &str = "problems_buffer";
/// Store name of the worker status hash.
pub const STATUS_KEY: &str = "solver_status";
/// Store name of the pending-request hash.
pub const REQUESTS_KEY: &str = "active_requests";

/// FIFO of serialized submissions waiting for an idle worker.
pub type BacklogQueue = DurableQueue<KeyFn>;
/// Worker id → problem id the worker last acknowledged running.
pub type StatusMap = WorkerMap<KeyFn>;
/// Worker id → serialized submission sent to it and not yet acknowledged.
pub type RequestMap = WorkerMap<KeyFn>;

/// Key of a status entry: the problem id itself, or nothing when idle.
pub fn status_key(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub fn backlog_queue(store: Arc<dyn KeyValueStore>) -> BacklogQueue {
    DurableQueue::new(store, BACKLOG_KEY, ProblemSubmission::problem_id_of as KeyFn)
}

pub fn status_map(store: Arc<dyn KeyValueStore>) -> StatusMap {
    WorkerMap::new(store, STATUS_KEY, status_key as KeyFn)
}

pub fn request_map(store: Arc<dyn KeyValueStore>) -> RequestMap {
    WorkerMap::new(store, REQUESTS_KEY, ProblemSubmission::problem_id_of as KeyFn)
}
