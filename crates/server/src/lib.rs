//! HTTP surface of the solvd orchestrator: router, middleware, shared state.

pub mod api;
pub mod metrics;
pub mod state;
