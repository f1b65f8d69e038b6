//! The worker loop.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{publish_json, BusConsumer, BusError, BusMessage, MessageBus};
use crate::metrics::{SOLVES_TOTAL, SOLVE_DURATION};
use crate::protocol::{topics, ProblemDeleted, ProblemResult, WorkerResponse};

use super::config::WorkerConfig;
use super::model::{SolveError, SolveOutcome, SolverCatalog};

/// Errors that stop the worker loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why [`SolverWorker::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested.
    Shutdown,
    /// The running problem was deleted. The solve cannot be interrupted, so
    /// the hosting process is expected to exit and be restarted.
    Abandoned { problem_id: String },
}

struct RunningSolve {
    problem_id: String,
    model: String,
    started_at: Instant,
    handle: JoinHandle<Result<SolveOutcome, SolveError>>,
}

/// One solver worker: at most one problem at a time.
pub struct SolverWorker {
    config: WorkerConfig,
    bus: Arc<dyn MessageBus>,
    catalog: SolverCatalog,
    current: Option<RunningSolve>,
}

impl SolverWorker {
    pub fn new(config: WorkerConfig, bus: Arc<dyn MessageBus>, catalog: SolverCatalog) -> Self {
        Self {
            config,
            bus,
            catalog,
            current: None,
        }
    }

    /// Problem currently being solved.
    pub fn current_problem(&self) -> Option<&str> {
        self.current.as_ref().map(|solve| solve.problem_id.as_str())
    }

    /// Announce idle, then serve requests until shutdown or until the running
    /// problem is deleted.
    pub async fn run(
        &mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<WorkerExit, WorkerError> {
        let solver_id = self.config.solver_id;
        let group = self.config.group_id();
        let request_topic = topics::worker_request_topic(solver_id);

        let mut requests = self.bus.subscribe(&group, &request_topic).await?;
        let mut deletions = self.bus.subscribe(&group, topics::PROBLEM_DELETED).await?;

        // Requests left from before a restart were either requeued by the
        // orchestrator or are about to be, once it sees the idle announcement
        let skipped = requests.skip_to_end().await?;
        if skipped > 0 {
            warn!(
                "Solver worker {} skipped {} requests left from a previous run",
                solver_id, skipped
            );
        }

        info!("Solver worker {} started", solver_id);
        self.respond(WorkerResponse::idle(solver_id)).await?;

        loop {
            match shutdown_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => {
                    info!("Solver worker {} shutting down", solver_id);
                    return Ok(WorkerExit::Shutdown);
                }
            }

            self.collect_finished().await?;

            if let Some(message) = self.next_message(requests.as_mut()).await {
                if let Some(request) = Self::decode(&message) {
                    self.handle_request(&request).await?;
                }
                Self::commit(requests.as_mut(), &message).await;
            }

            if let Some(message) = self.next_message(deletions.as_mut()).await {
                Self::commit(deletions.as_mut(), &message).await;
                if let Some(deletion) = Self::decode(&message) {
                    if let Some(exit) = self.handle_deletion(&deletion) {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    async fn next_message(&self, consumer: &mut dyn BusConsumer) -> Option<BusMessage> {
        match consumer.poll(self.config.poll_timeout()).await {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to poll {}: {}", consumer.topic(), e);
                None
            }
        }
    }

    async fn commit(consumer: &mut dyn BusConsumer, message: &BusMessage) {
        if let Err(e) = consumer.commit(message).await {
            error!("Failed to commit {}:{}: {}", message.topic, message.offset, e);
        }
    }

    /// JSON payload, or `None` for null and undecodable messages.
    fn decode(message: &BusMessage) -> Option<Value> {
        match serde_json::from_str::<Value>(&message.payload) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    "Skipping undecodable message at {}:{}: {}",
                    message.topic, message.offset, e
                );
                None
            }
        }
    }

    /// Handle one message from this worker's request topic.
    pub async fn handle_request(&mut self, request: &Value) -> Result<(), WorkerError> {
        let solver_id = self.config.solver_id;

        if let Some(current) = self.current_problem() {
            warn!("Received request while busy with problem {}", current);
            let ack = WorkerResponse::running(solver_id, current);
            return self.respond(ack).await;
        }

        let Some(problem_id) = request.get("problemId").and_then(Value::as_str) else {
            debug!("Status probe received, reporting idle");
            return self.respond(WorkerResponse::idle(solver_id)).await;
        };

        let field = |name: &str| request.get(name).filter(|value| !value.is_null());
        let (model_id, metadata, input_data) =
            match (field("modelId"), field("metadata"), field("inputData")) {
                (Some(model_id), Some(metadata), Some(input_data)) => {
                    (model_id, metadata, input_data)
                }
                (model_id, metadata, _) => {
                    let missing = if model_id.is_none() {
                        "modelId"
                    } else if metadata.is_none() {
                        "metadata"
                    } else {
                        "inputData"
                    };
                    let error = format!("Invalid data - Missing required input '{}'", missing);
                    warn!("Rejecting problem {}: {}", problem_id, error);
                    return self.reject(problem_id, "unknown", error).await;
                }
            };

        let model_label = model_id.as_str().unwrap_or_default().to_string();
        info!("Received problem {} (model {})", problem_id, model_label);

        let prepared = model_id
            .as_str()
            .ok_or_else(|| SolveError::InvalidInput("modelId must be a string".to_string()))
            .and_then(|model_id| self.catalog.resolve(model_id))
            .and_then(|engine| engine.prepare(metadata, input_data));

        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Rejecting problem {}: {}", problem_id, e);
                return self.reject(problem_id, &model_label, e.to_string()).await;
            }
        };

        self.respond(WorkerResponse::running(solver_id, problem_id))
            .await?;
        info!("Execution started for problem {}", problem_id);

        let time_limit = self.config.time_limit();
        let handle = tokio::task::spawn_blocking(move || prepared.solve(time_limit));
        self.current = Some(RunningSolve {
            problem_id: problem_id.to_string(),
            model: model_label,
            started_at: Instant::now(),
            handle,
        });
        Ok(())
    }

    /// Handle a deletion notice. Returns an exit when the running problem
    /// was deleted.
    pub fn handle_deletion(&mut self, deletion: &Value) -> Option<WorkerExit> {
        let deletion: ProblemDeleted = match serde_json::from_value(deletion.clone()) {
            Ok(deletion) => deletion,
            Err(e) => {
                debug!("Ignoring malformed deletion notice: {}", e);
                return None;
            }
        };

        if self.current_problem() != Some(deletion.problem_id.as_str()) {
            debug!("Ignoring deletion of problem {}", deletion.problem_id);
            return None;
        }

        warn!(
            "Abandoning execution of deleted problem {}",
            deletion.problem_id
        );
        // The blocking solve keeps running until the process exits
        self.current = None;
        Some(WorkerExit::Abandoned {
            problem_id: deletion.problem_id,
        })
    }

    /// Report a solve that has finished since the last check.
    async fn collect_finished(&mut self) -> Result<(), WorkerError> {
        if !self
            .current
            .as_ref()
            .is_some_and(|solve| solve.handle.is_finished())
        {
            return Ok(());
        }
        let Some(solve) = self.current.take() else {
            return Ok(());
        };

        let solver_id = self.config.solver_id;
        let elapsed = solve.started_at.elapsed().as_secs_f64();
        let outcome = match solve.handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(SolveError::Failed(format!("solver task aborted: {}", e))),
        };

        match outcome {
            Ok(outcome) => {
                info!(
                    "Execution finished for problem {} in {:.3}s",
                    solve.problem_id, outcome.execution_time
                );
                SOLVES_TOTAL
                    .with_label_values(&[solve.model.as_str(), "success"])
                    .inc();
                SOLVE_DURATION
                    .with_label_values(&[solve.model.as_str()])
                    .observe(elapsed);

                let result = ProblemResult {
                    problem_id: solve.problem_id,
                    solver_id,
                    execution_time: outcome.execution_time,
                    result: serde_json::to_string(&outcome.to_result_json())?,
                };
                publish_json(self.bus.as_ref(), topics::PROBLEM_RESULT, &result).await?;
            }
            Err(e) => {
                error!("Execution failed for problem {}: {}", solve.problem_id, e);
                SOLVES_TOTAL
                    .with_label_values(&[solve.model.as_str(), "failed"])
                    .inc();
                self.respond(WorkerResponse::failed(
                    solver_id,
                    solve.problem_id,
                    e.to_string(),
                ))
                .await?;
            }
        }
        Ok(())
    }

    async fn reject(
        &self,
        problem_id: &str,
        model: &str,
        error: String,
    ) -> Result<(), WorkerError> {
        SOLVES_TOTAL.with_label_values(&[model, "rejected"]).inc();
        self.respond(WorkerResponse::failed(
            self.config.solver_id,
            problem_id,
            error,
        ))
        .await
    }

    async fn respond(&self, response: WorkerResponse) -> Result<(), WorkerError> {
        publish_json(self.bus.as_ref(), topics::PROBLEM_EXECUTE_RES, &response).await?;
        Ok(())
    }
}
