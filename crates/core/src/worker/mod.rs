//! Worker-side runtime: consumes a worker's request topic, runs one solve at
//! a time and reports back to the orchestrator.

mod config;
mod model;
mod runner;

pub use config::WorkerConfig;
pub use model::{
    Objective, PreparedSolve, SolveError, SolveOutcome, SolverCatalog, SolverEngine, SolverModel,
};
pub use runner::{SolverWorker, WorkerError, WorkerExit};
