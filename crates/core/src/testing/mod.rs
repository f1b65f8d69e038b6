//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use solvd_core::testing::{fixtures, MockSolverEngine};
//! use solvd_core::worker::SolverModel;
//!
//! let engine = MockSolverEngine::new(SolverModel::LinearProgramming);
//! engine.reject_next("Missing objective function");
//!
//! let submission = fixtures::submission("p1");
//! ```

mod mock_solver_engine;

pub use mock_solver_engine::{MockSolverEngine, RecordedPrepare};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use serde_json::json;

    use crate::bus::MemoryBus;
    use crate::orchestrator::{OrchestratorConfig, Reconciler};
    use crate::protocol::{ProblemResult, ProblemSubmission, WorkerId};
    use crate::store::{KeyValueStore, MemoryStore};

    /// A linear-programming submission with small, valid-looking payloads.
    pub fn submission(problem_id: &str) -> ProblemSubmission {
        ProblemSubmission::new(
            problem_id,
            "LP",
            json!({"objective": "max", "variables": ["x", "y"]}),
            json!({"constraints": [[1, 1, "<=", 4]]}),
        )
    }

    /// A result from `worker` for `problem_id`.
    pub fn result(problem_id: &str, worker: WorkerId) -> ProblemResult {
        ProblemResult {
            problem_id: problem_id.to_string(),
            solver_id: worker,
            execution_time: 0.25,
            result: json!({"objective": 4.0}).to_string(),
        }
    }

    /// Orchestrator config for a pool of `workers`.
    pub fn orchestrator_config(workers: WorkerId) -> OrchestratorConfig {
        OrchestratorConfig {
            workers,
            ..Default::default()
        }
    }

    /// A reconciler over fresh in-memory backends.
    pub fn reconciler(workers: WorkerId) -> (Arc<dyn KeyValueStore>, MemoryBus, Reconciler) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let bus = MemoryBus::new();
        let reconciler = Reconciler::new(
            orchestrator_config(workers),
            Arc::clone(&store),
            Arc::new(bus.clone()),
        );
        (store, bus, reconciler)
    }
}
