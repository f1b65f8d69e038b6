//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::WorkerId;

/// Configuration for one solver worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// This worker's id, in `[1..N]` of the orchestrator's pool.
    pub solver_id: WorkerId,

    /// Consumer group prefix; the worker consumes as `{group_prefix}-{solver_id}`.
    #[serde(default = "default_group_prefix")]
    pub group_prefix: String,

    /// Solver time limit handed to every solve (seconds).
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,

    /// Bounded wait per topic poll (milliseconds).
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

fn default_group_prefix() -> String {
    "solver".to_string()
}

fn default_time_limit() -> u64 {
    60
}

fn default_poll_timeout() -> u64 {
    200
}

impl WorkerConfig {
    pub fn new(solver_id: WorkerId) -> Self {
        Self {
            solver_id,
            group_prefix: default_group_prefix(),
            time_limit_secs: default_time_limit(),
            poll_timeout_ms: default_poll_timeout(),
        }
    }

    pub fn group_id(&self) -> String {
        format!("{}-{}", self.group_prefix, self.solver_id)
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::new(3);
        assert_eq!(config.group_id(), "solver-3");
        assert_eq!(config.time_limit(), Duration::from_secs(60));
        assert_eq!(config.poll_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn test_deserialize() {
        let toml = r#"
            solver_id = 2
            group_prefix = "or-tools"
            time_limit_secs = 5
        "#;
        let config: WorkerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.group_id(), "or-tools-2");
        assert_eq!(config.time_limit_secs, 5);
        assert_eq!(config.poll_timeout_ms, 200);
    }
}
