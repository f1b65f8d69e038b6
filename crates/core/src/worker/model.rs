//! Solver models and the engine seam.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while preparing or running a solve.
#[derive(Debug, Error)]
pub enum SolveError {
    /// Metadata or input data is malformed, incomplete or inconsistent.
    #[error("{0}")]
    InvalidInput(String),

    /// The solver itself failed.
    #[error("solver failed: {0}")]
    Failed(String),
}

/// The optimization models a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverModel {
    #[serde(rename = "LP")]
    LinearProgramming,
    #[serde(rename = "VRP")]
    VehicleRouting,
}

impl SolverModel {
    pub const ALL: [SolverModel; 2] = [SolverModel::LinearProgramming, SolverModel::VehicleRouting];

    /// The `modelId` that selects this model.
    pub fn id(&self) -> &'static str {
        match self {
            SolverModel::LinearProgramming => "LP",
            SolverModel::VehicleRouting => "VRP",
        }
    }
}

impl fmt::Display for SolverModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SolverModel {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SolverModel::ALL
            .into_iter()
            .find(|model| model.id() == s)
            .ok_or_else(|| SolveError::InvalidInput(format!("Unknown model ID {}", s)))
    }
}

/// Objective value, or a readable reason why there is none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Objective {
    Value(f64),
    NoSolution(String),
}

/// What a finished solve reports.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    /// Seconds spent solving.
    pub execution_time: f64,
    pub objective: Objective,
    /// Model-specific result fields, merged next to `objective`.
    pub details: Map<String, Value>,
}

impl SolveOutcome {
    pub fn new(execution_time: f64, objective: Objective) -> Self {
        Self {
            execution_time,
            objective,
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// The result object. Always has an `objective` key.
    pub fn to_result_json(&self) -> Value {
        let mut result = self.details.clone();
        let objective = match &self.objective {
            Objective::Value(value) => Value::from(*value),
            Objective::NoSolution(reason) => Value::from(reason.as_str()),
        };
        result.insert("objective".to_string(), objective);
        Value::Object(result)
    }
}

/// A validated problem ready to run.
pub trait PreparedSolve: Send {
    /// Run the solver, giving up after `time_limit`. Blocking.
    fn solve(self: Box<Self>, time_limit: Duration) -> Result<SolveOutcome, SolveError>;
}

/// One optimization engine.
pub trait SolverEngine: Send + Sync {
    fn model(&self) -> SolverModel;

    /// Validate `metadata` and `input_data` and build the solve.
    fn prepare(&self, metadata: &Value, input_data: &Value)
        -> Result<Box<dyn PreparedSolve>, SolveError>;
}

/// Engines available to a worker, one per model.
#[derive(Clone, Default)]
pub struct SolverCatalog {
    engines: HashMap<SolverModel, Arc<dyn SolverEngine>>,
}

impl SolverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, engine: Arc<dyn SolverEngine>) -> Self {
        self.engines.insert(engine.model(), engine);
        self
    }

    pub fn models(&self) -> Vec<SolverModel> {
        let mut models: Vec<_> = self.engines.keys().copied().collect();
        models.sort_by_key(|model| model.id());
        models
    }

    /// Engine for a `modelId`.
    pub fn resolve(&self, model_id: &str) -> Result<Arc<dyn SolverEngine>, SolveError> {
        let model: SolverModel = model_id.parse()?;
        self.engines
            .get(&model)
            .cloned()
            .ok_or_else(|| SolveError::InvalidInput(format!("No engine for model ID {}", model)))
    }
}
