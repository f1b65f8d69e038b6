//! Mock solver engine for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use crate::worker::{Objective, PreparedSolve, SolveError, SolveOutcome, SolverEngine, SolverModel};

/// A recorded `prepare` call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPrepare {
    pub metadata: Value,
    pub input_data: Value,
}

#[derive(Debug, Default)]
struct MockState {
    prepared: Vec<RecordedPrepare>,
    prepare_errors: VecDeque<String>,
    solve_errors: VecDeque<String>,
}

/// Mock implementation of the SolverEngine trait.
///
/// Provides controllable behavior for testing:
/// - Track prepared problems for assertions
/// - Reject input as invalid
/// - Fail a solve
/// - Delay solves to keep the worker busy
///
/// Clones share state, so a test can keep a handle after registering the
/// engine with a catalog.
#[derive(Debug, Clone)]
pub struct MockSolverEngine {
    model: SolverModel,
    objective: f64,
    solve_delay: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockSolverEngine {
    pub fn new(model: SolverModel) -> Self {
        Self {
            model,
            objective: 1.0,
            solve_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Make every solve take at least `delay`.
    pub fn with_solve_delay(mut self, delay: Duration) -> Self {
        self.solve_delay = delay;
        self
    }

    pub fn with_objective(mut self, objective: f64) -> Self {
        self.objective = objective;
        self
    }

    /// The next `prepare` fails with an input-validation error.
    pub fn reject_next(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .prepare_errors
            .push_back(message.to_string());
    }

    /// The next solve fails.
    pub fn fail_next_solve(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .solve_errors
            .push_back(message.to_string());
    }

    /// Successful `prepare` calls so far.
    pub fn prepared(&self) -> Vec<RecordedPrepare> {
        self.state.lock().unwrap().prepared.clone()
    }
}

impl SolverEngine for MockSolverEngine {
    fn model(&self) -> SolverModel {
        self.model
    }

    fn prepare(
        &self,
        metadata: &Value,
        input_data: &Value,
    ) -> Result<Box<dyn PreparedSolve>, SolveError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.prepare_errors.pop_front() {
            return Err(SolveError::InvalidInput(message));
        }

        state.prepared.push(RecordedPrepare {
            metadata: metadata.clone(),
            input_data: input_data.clone(),
        });

        Ok(Box::new(MockSolve {
            model: self.model,
            objective: self.objective,
            delay: self.solve_delay,
            error: state.solve_errors.pop_front(),
        }))
    }
}

struct MockSolve {
    model: SolverModel,
    objective: f64,
    delay: Duration,
    error: Option<String>,
}

impl PreparedSolve for MockSolve {
    fn solve(self: Box<Self>, time_limit: Duration) -> Result<SolveOutcome, SolveError> {
        std::thread::sleep(self.delay.min(time_limit));

        if let Some(message) = self.error {
            return Err(SolveError::Failed(message));
        }

        Ok(
            SolveOutcome::new(self.delay.as_secs_f64(), Objective::Value(self.objective))
                .with_detail("model", json!(self.model.id())),
        )
    }
}
