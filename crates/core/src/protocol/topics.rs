//! Topic names shared by the orchestrator, the workers and the callers.

use super::WorkerId;

/// New problem submissions from callers.
pub const PROBLEM_EXECUTE_REQ: &str = "problem-execute-req";
/// Worker acknowledgements: idle, error, running.
pub const PROBLEM_EXECUTE_RES: &str = "problem-execute-res";
/// Finished executions.
pub const PROBLEM_RESULT: &str = "problem-result";
/// Deletion notices.
pub const PROBLEM_DELETED: &str = "problem-deleted";
/// Advisory to callers: a dropped problem must be resubmitted.
pub const PROBLEM_EXECUTE_RESEND: &str = "problem-execute-resend";

/// Every topic the orchestrator consumes, in polling order.
pub const ORCHESTRATOR_INBOUND: [&str; 4] = [
    PROBLEM_EXECUTE_REQ,
    PROBLEM_EXECUTE_RES,
    PROBLEM_RESULT,
    PROBLEM_DELETED,
];

/// Dedicated dispatch topic of one worker.
pub fn worker_request_topic(worker: WorkerId) -> String {
    format!("{}-{}", PROBLEM_EXECUTE_REQ, worker)
}
