//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::WorkerId;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Size of the worker pool. Worker ids run from 1 to this value.
    #[serde(default = "default_workers")]
    pub workers: WorkerId,

    /// How long a `deleted` tag is kept (seconds).
    #[serde(default = "default_retention")]
    pub deleted_retention_secs: u64,

    /// How long an `executed` tag is kept (seconds).
    #[serde(default = "default_retention")]
    pub executed_retention_secs: u64,

    /// Log a warning when the backlog grows past this many entries (0 = never).
    #[serde(default = "default_backlog_warn_threshold")]
    pub backlog_warn_threshold: usize,

    /// Ask every worker to report its state when the orchestrator starts.
    #[serde(default = "default_true")]
    pub probe_workers_on_start: bool,
}

fn default_workers() -> WorkerId {
    1
}

fn default_retention() -> u64 {
    86_400 // 1 day
}

fn default_backlog_warn_threshold() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl OrchestratorConfig {
    pub fn deleted_retention(&self) -> Duration {
        Duration::from_secs(self.deleted_retention_secs)
    }

    pub fn executed_retention(&self) -> Duration {
        Duration::from_secs(self.executed_retention_secs)
    }

    /// Every worker id in the pool, ascending.
    pub fn worker_ids(&self) -> impl Iterator<Item = WorkerId> {
        1..=self.workers
    }

    pub fn is_known_worker(&self, worker: WorkerId) -> bool {
        (1..=self.workers).contains(&worker)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            deleted_retention_secs: default_retention(),
            executed_retention_secs: default_retention(),
            backlog_warn_threshold: default_backlog_warn_threshold(),
            probe_workers_on_start: true,
        }
    }
}
