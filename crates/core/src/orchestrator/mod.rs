//! Dispatch and reconciliation of problems across the worker pool.
//!
//! The orchestrator is a single sequential actor:
//! - **Reconciler**: applies one inbound event to the durable store, then
//!   drains the backlog into idle workers
//! - **EventLoop**: polls the inbound topics round-robin and commits a message
//!   only after it was handled
//! - **OrchestratorRunner**: owns the event loop task and its shutdown

mod config;
mod engine;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use engine::Reconciler;
pub use runner::{EventLoop, OrchestratorRunner};
pub use types::{OrchestratorError, RoundSummary};
