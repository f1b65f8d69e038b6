//! Reconciliation engine and dispatch loop.
//!
//! Per-worker state is derived from two durable entries:
//!
//! | status | request          | state     |
//! |--------|------------------|-----------|
//! | EMPTY  | EMPTY            | IDLE      |
//! | EMPTY or ≠ P | P          | REQUESTED |
//! | P      | any              | RUNNING   |
//!
//! Every handler re-derives what to do from the stored status, the stored
//! request and the backlog rather than trusting the event alone: the bus
//! gives no ordering across topics and delivers at least once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bus::{publish_json, MessageBus};
use crate::metrics::{
    BACKLOG_DEPTH, DISPATCHES_TOTAL, DROPPED_SUBMISSIONS_TOTAL, REQUEUES_TOTAL,
    RESEND_ADVISORIES_TOTAL,
};
use crate::primitives::{
    backlog_queue, request_map, status_map, BacklogQueue, ProblemMarkers, RequestMap, StatusMap,
};
use crate::protocol::{
    topics, InboundEvent, ProblemDeleted, ProblemResult, ProblemSubmission, ResendAdvisory,
    ResponseKind, StatusProbe, WorkerId, WorkerResponse,
};
use crate::store::KeyValueStore;

use super::config::OrchestratorConfig;
use super::types::OrchestratorError;

/// Where a dispatched submission came from.
#[derive(Debug, Clone, Copy)]
enum DispatchSource {
    Inbound,
    Backlog,
}

impl DispatchSource {
    fn as_str(&self) -> &'static str {
        match self {
            DispatchSource::Inbound => "inbound",
            DispatchSource::Backlog => "backlog",
        }
    }
}

/// Applies inbound events to the durable state and dispatches work.
///
/// Holds no authoritative state of its own; a new instance over the same
/// store continues exactly where a previous one stopped.
pub struct Reconciler {
    config: OrchestratorConfig,
    bus: Arc<dyn MessageBus>,
    backlog: BacklogQueue,
    statuses: StatusMap,
    requests: RequestMap,
    markers: ProblemMarkers,
}

impl Reconciler {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn KeyValueStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        let markers = ProblemMarkers::new(
            Arc::clone(&store),
            config.deleted_retention(),
            config.executed_retention(),
        );

        Self {
            backlog: backlog_queue(Arc::clone(&store)),
            statuses: status_map(Arc::clone(&store)),
            requests: request_map(store),
            markers,
            config,
            bus,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Apply one decoded inbound event.
    pub async fn handle(&self, event: InboundEvent) -> Result<(), OrchestratorError> {
        match event {
            InboundEvent::Request(submission) => self.handle_request(&submission).await,
            InboundEvent::Response(response) => self.handle_response(&response).await,
            InboundEvent::Result(result) => self.handle_result(&result).await,
            InboundEvent::Deletion(deletion) => self.handle_deletion(&deletion),
        }
    }

    /// New submission: dispatch to an idle worker or append to the backlog.
    pub async fn handle_request(
        &self,
        submission: &ProblemSubmission,
    ) -> Result<(), OrchestratorError> {
        let problem_id = submission.problem_id.as_str();

        if let Some(reason) = self.duplicate_reason(problem_id)? {
            warn!("Dropping submission {}: already {}", problem_id, reason);
            DROPPED_SUBMISSIONS_TOTAL.with_label_values(&[reason]).inc();
            return Ok(());
        }

        // Older work first
        if !self.backlog.is_empty()? {
            self.process_backlog().await?;
        }

        let payload = serde_json::to_string(submission)?;
        match self.idle_worker()? {
            Some(worker) => {
                self.dispatch(worker, problem_id, &payload, DispatchSource::Inbound)
                    .await?
            }
            None => {
                info!("All workers busy, queueing problem {}", problem_id);
                self.backlog.enqueue(&payload, false)?;
                self.record_backlog_depth()?;
            }
        }
        Ok(())
    }

    /// Worker acknowledgement: idle announcement, error or running ack.
    pub async fn handle_response(&self, response: &WorkerResponse) -> Result<(), OrchestratorError> {
        let worker = response.solver_id;
        if !self.config.is_known_worker(worker) {
            warn!("Ignoring response from unknown worker {}", worker);
            return Ok(());
        }

        match response.kind() {
            ResponseKind::Idle => self.on_idle(worker).await,
            ResponseKind::Failed { problem_id, error } => {
                warn!(
                    "Worker {} failed problem {}: {}",
                    worker, problem_id, error
                );
                self.statuses.clear(worker)?;
                self.cleanup(worker, problem_id)
            }
            ResponseKind::Running { problem_id } => self.on_running(worker, problem_id).await,
        }
    }

    /// Finished execution: free the worker and tag the problem executed.
    pub async fn handle_result(&self, result: &ProblemResult) -> Result<(), OrchestratorError> {
        let worker = result.solver_id;
        if !self.config.is_known_worker(worker) {
            warn!("Ignoring result from unknown worker {}", worker);
            return Ok(());
        }

        let problem_id = result.problem_id.as_str();
        let previous = self.statuses.occupied(worker)?;
        self.resend_if_stale(worker, previous.as_deref(), problem_id)
            .await?;

        info!(
            "Worker {} finished problem {} in {:.3}s",
            worker, problem_id, result.execution_time
        );
        self.statuses.clear(worker)?;
        self.markers.mark_executed(problem_id)?;
        self.cleanup(worker, problem_id)
    }

    /// Deletion: tag the problem and withdraw it from the backlog and from
    /// any pending request.
    pub fn handle_deletion(&self, deletion: &ProblemDeleted) -> Result<(), OrchestratorError> {
        let problem_id = deletion.problem_id.as_str();
        self.markers.mark_deleted(problem_id)?;

        if self.backlog.delete(problem_id)? {
            info!("Removed deleted problem {} from backlog", problem_id);
            self.record_backlog_depth()?;
        }

        for worker in self.config.worker_ids() {
            if self.requests.is_equal(worker, problem_id)? {
                info!(
                    "Cleared pending request of worker {} for deleted problem {}",
                    worker, problem_id
                );
                self.requests.clear(worker)?;
            }
        }
        Ok(())
    }

    /// Dispatch loop: assign backlog heads to idle workers until one of the
    /// two runs out.
    pub async fn process_backlog(&self) -> Result<(), OrchestratorError> {
        while let Some(worker) = self.idle_worker()? {
            let Some(payload) = self.backlog.dequeue()? else {
                break;
            };

            let Some(problem_id) = ProblemSubmission::problem_id_of(&payload) else {
                warn!("Discarding backlog entry without problemId: {}", payload);
                continue;
            };

            if self.markers.is_deleted(&problem_id)? {
                info!("Skipping deleted problem {} from backlog", problem_id);
                continue;
            }

            self.dispatch(worker, &problem_id, &payload, DispatchSource::Backlog)
                .await?;
        }

        self.record_backlog_depth()
    }

    /// Ask every worker to announce its state.
    pub async fn probe_workers(&self) -> Result<(), OrchestratorError> {
        for worker in self.config.worker_ids() {
            publish_json(
                self.bus.as_ref(),
                &topics::worker_request_topic(worker),
                &StatusProbe::default(),
            )
            .await?;
        }
        info!("Probed {} workers for their state", self.config.workers);
        Ok(())
    }

    /// Lowest-numbered worker that announced itself and holds nothing.
    fn idle_worker(&self) -> Result<Option<WorkerId>, OrchestratorError> {
        for worker in self.config.worker_ids() {
            // No status entry yet: the worker never announced itself
            let announced_idle = self.statuses.get(worker)?.is_some_and(|s| s.is_empty());
            if announced_idle && self.requests.occupied(worker)?.is_none() {
                return Ok(Some(worker));
            }
        }
        Ok(None)
    }

    /// Another worker whose status already names `problem_id`.
    fn running_elsewhere(
        &self,
        worker: WorkerId,
        problem_id: &str,
    ) -> Result<Option<WorkerId>, OrchestratorError> {
        for other in self.config.worker_ids().filter(|other| *other != worker) {
            if self.statuses.is_equal(other, problem_id)? {
                return Ok(Some(other));
            }
        }
        Ok(None)
    }

    fn duplicate_reason(&self, problem_id: &str) -> Result<Option<&'static str>, OrchestratorError> {
        if self.markers.is_deleted(problem_id)? {
            return Ok(Some("deleted"));
        }
        if self.backlog.find(problem_id)?.is_some() {
            return Ok(Some("queued"));
        }
        for worker in self.config.worker_ids() {
            if self.requests.is_equal(worker, problem_id)? {
                return Ok(Some("requested"));
            }
            if self.statuses.is_equal(worker, problem_id)? {
                return Ok(Some("running"));
            }
        }
        Ok(None)
    }

    /// Record the request, then publish it. A failed publish is rolled back
    /// so the submission is not lost.
    async fn dispatch(
        &self,
        worker: WorkerId,
        problem_id: &str,
        payload: &str,
        source: DispatchSource,
    ) -> Result<(), OrchestratorError> {
        self.requests.update(worker, payload)?;

        if let Err(e) = self
            .bus
            .publish(&topics::worker_request_topic(worker), payload)
            .await
        {
            warn!(
                "Failed to dispatch problem {} to worker {}, returning it to the backlog: {}",
                problem_id, worker, e
            );
            self.requests.clear(worker)?;
            // A backlog head goes back where it was; a new submission joins the tail
            self.backlog
                .enqueue(payload, matches!(source, DispatchSource::Backlog))?;
            self.record_backlog_depth()?;
            return Err(e.into());
        }

        info!("Dispatched problem {} to worker {}", problem_id, worker);
        DISPATCHES_TOTAL.with_label_values(&[source.as_str()]).inc();
        Ok(())
    }

    async fn on_idle(&self, worker: WorkerId) -> Result<(), OrchestratorError> {
        if let Some(previous) = self.statuses.occupied(worker)? {
            if self.markers.is_deleted(&previous)? {
                info!(
                    "Worker {} dropped deleted problem {}, nothing to resend",
                    worker, previous
                );
            } else {
                warn!(
                    "Worker {} announced idle while running problem {}",
                    worker, previous
                );
                self.resend(&previous).await?;
            }
        }

        self.statuses.clear(worker)?;

        if let Some(pending) = self.requests.occupied(worker)? {
            self.requeue(&pending)?;
            self.requests.clear(worker)?;
        }

        debug!("Worker {} is idle", worker);
        Ok(())
    }

    async fn on_running(&self, worker: WorkerId, problem_id: &str) -> Result<(), OrchestratorError> {
        let previous = self.statuses.occupied(worker)?;
        self.resend_if_stale(worker, previous.as_deref(), problem_id)
            .await?;

        let refusal = if self.markers.is_executed(problem_id)? {
            Some("already executed".to_string())
        } else {
            self.running_elsewhere(worker, problem_id)?
                .map(|other| format!("already running on worker {}", other))
        };

        match refusal {
            Some(reason) => {
                warn!(
                    "Ignoring running ack from worker {} for problem {}: {}",
                    worker, problem_id, reason
                );
                // The stale status was just resent; do not keep pointing at it
                if previous.as_deref().is_some_and(|p| p != problem_id) {
                    self.statuses.clear(worker)?;
                }
            }
            None => {
                info!("Worker {} is running problem {}", worker, problem_id);
                self.statuses.update(worker, problem_id)?;
            }
        }

        self.cleanup(worker, problem_id)
    }

    /// The worker's status named a different problem than the one it now
    /// reports on: that problem was dropped and its caller must resubmit.
    async fn resend_if_stale(
        &self,
        worker: WorkerId,
        previous: Option<&str>,
        problem_id: &str,
    ) -> Result<(), OrchestratorError> {
        let Some(previous) = previous.filter(|p| *p != problem_id) else {
            return Ok(());
        };

        if self.markers.is_deleted(previous)? {
            info!(
                "Worker {} moved on from deleted problem {}",
                worker, previous
            );
        } else {
            warn!(
                "Worker {} reported problem {} while its status was {}",
                worker, problem_id, previous
            );
            self.resend(previous).await?;
        }
        Ok(())
    }

    /// After a response or result: the problem is accounted for, and a
    /// different pending request for the worker was superseded.
    fn cleanup(&self, worker: WorkerId, problem_id: &str) -> Result<(), OrchestratorError> {
        if self.backlog.delete(problem_id)? {
            info!(
                "Removed problem {} from backlog, worker {} already has it",
                problem_id, worker
            );
        }

        if let Some(pending) = self.requests.occupied(worker)? {
            if ProblemSubmission::problem_id_of(&pending).as_deref() != Some(problem_id) {
                self.requeue(&pending)?;
            }
        }
        self.requests.clear(worker)?;
        Ok(())
    }

    /// Put a previously dispatched submission back at the head of the backlog.
    fn requeue(&self, payload: &str) -> Result<(), OrchestratorError> {
        let Some(problem_id) = ProblemSubmission::problem_id_of(payload) else {
            warn!("Not requeueing request without problemId: {}", payload);
            return Ok(());
        };

        if self.markers.is_deleted(&problem_id)? {
            info!("Not requeueing deleted problem {}", problem_id);
            return Ok(());
        }
        if self.backlog.find(&problem_id)?.is_some() {
            warn!("Not requeueing problem {}: already in backlog", problem_id);
            return Ok(());
        }

        info!("Requeueing problem {} at the head of the backlog", problem_id);
        self.backlog.enqueue(payload, true)?;
        REQUEUES_TOTAL.inc();
        Ok(())
    }

    async fn resend(&self, problem_id: &str) -> Result<(), OrchestratorError> {
        publish_json(
            self.bus.as_ref(),
            topics::PROBLEM_EXECUTE_RESEND,
            &ResendAdvisory {
                problem_id: problem_id.to_string(),
            },
        )
        .await?;
        info!("Published resend advisory for problem {}", problem_id);
        RESEND_ADVISORIES_TOTAL.inc();
        Ok(())
    }

    fn record_backlog_depth(&self) -> Result<(), OrchestratorError> {
        let depth = self.backlog.len()?;
        BACKLOG_DEPTH.set(depth as i64);

        let threshold = self.config.backlog_warn_threshold;
        if threshold > 0 && depth > threshold {
            warn!(
                "Backlog holds {} problems, above the warning threshold of {}",
                depth, threshold
            );
        }
        Ok(())
    }
}
