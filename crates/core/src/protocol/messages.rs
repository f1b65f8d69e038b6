use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::topics;

/// Worker ids are small positive integers in `[1..N]`.
pub type WorkerId = u32;

/// A problem submission as published by callers and forwarded to workers.
///
/// Only `problemId` is needed for dispatch; the rest is passed through to the
/// solver untouched, including fields this crate does not know about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSubmission {
    pub problem_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProblemSubmission {
    pub fn new(
        problem_id: impl Into<String>,
        model_id: impl Into<String>,
        metadata: Value,
        input_data: Value,
    ) -> Self {
        Self {
            problem_id: problem_id.into(),
            model_id: Some(model_id.into()),
            metadata: Some(metadata),
            input_data: Some(input_data),
            extra: Map::new(),
        }
    }

    /// Extract `problemId` from a serialized submission without decoding the
    /// payload fields.
    pub fn problem_id_of(serialized: &str) -> Option<String> {
        #[derive(Deserialize)]
        struct IdOnly {
            #[serde(rename = "problemId")]
            problem_id: Option<String>,
        }

        serde_json::from_str::<IdOnly>(serialized)
            .ok()
            .and_then(|parsed| parsed.problem_id)
    }
}

/// Acknowledgement from a worker on `problem-execute-res`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    /// `null` means "I am idle".
    #[serde(default)]
    pub problem_id: Option<String>,
    pub solver_id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The three shapes a [`WorkerResponse`] can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind<'a> {
    Idle,
    Failed { problem_id: &'a str, error: &'a str },
    Running { problem_id: &'a str },
}

impl WorkerResponse {
    pub fn idle(solver_id: WorkerId) -> Self {
        Self {
            problem_id: None,
            solver_id,
            error: None,
        }
    }

    pub fn running(solver_id: WorkerId, problem_id: impl Into<String>) -> Self {
        Self {
            problem_id: Some(problem_id.into()),
            solver_id,
            error: None,
        }
    }

    pub fn failed(
        solver_id: WorkerId,
        problem_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            problem_id: Some(problem_id.into()),
            solver_id,
            error: Some(error.into()),
        }
    }

    pub fn kind(&self) -> ResponseKind<'_> {
        match (&self.problem_id, &self.error) {
            (None, _) => ResponseKind::Idle,
            (Some(problem_id), Some(error)) => ResponseKind::Failed {
                problem_id: problem_id.as_str(),
                error: error.as_str(),
            },
            (Some(problem_id), None) => ResponseKind::Running {
                problem_id: problem_id.as_str(),
            },
        }
    }
}

/// A finished execution on `problem-result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemResult {
    pub problem_id: String,
    pub solver_id: WorkerId,
    /// Seconds spent in the solver.
    #[serde(default)]
    pub execution_time: f64,
    /// JSON-encoded result object.
    #[serde(default)]
    pub result: String,
}

/// Deletion notice on `problem-deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDeleted {
    pub problem_id: String,
}

/// Advisory on `problem-execute-resend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendAdvisory {
    pub problem_id: String,
}

/// Sent to a worker's request topic to make it report its state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusProbe {
    pub problem_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message on {topic} is not valid JSON for its topic: {source}")]
    Malformed {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("message on {0} carries a blank problemId")]
    BlankProblemId(String),

    #[error("no handler for topic {0}")]
    UnknownTopic(String),
}

/// A decoded message from one of the orchestrator's inbound topics.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Request(ProblemSubmission),
    Response(WorkerResponse),
    Result(ProblemResult),
    Deletion(ProblemDeleted),
}

impl InboundEvent {
    /// Decode a payload received on `topic`.
    ///
    /// A literal `null` payload decodes to `Ok(None)`: nothing to handle.
    pub fn decode(topic: &str, payload: &str) -> Result<Option<Self>, DecodeError> {
        let malformed = |source| DecodeError::Malformed {
            topic: topic.to_string(),
            source,
        };

        let value: Value = serde_json::from_str(payload).map_err(malformed)?;
        if value.is_null() {
            return Ok(None);
        }

        let event = match topic {
            topics::PROBLEM_EXECUTE_REQ => {
                InboundEvent::Request(serde_json::from_value(value).map_err(malformed)?)
            }
            topics::PROBLEM_EXECUTE_RES => {
                InboundEvent::Response(serde_json::from_value(value).map_err(malformed)?)
            }
            topics::PROBLEM_RESULT => {
                InboundEvent::Result(serde_json::from_value(value).map_err(malformed)?)
            }
            topics::PROBLEM_DELETED => {
                InboundEvent::Deletion(serde_json::from_value(value).map_err(malformed)?)
            }
            other => return Err(DecodeError::UnknownTopic(other.to_string())),
        };

        if event.problem_id().is_some_and(|id| id.trim().is_empty()) {
            return Err(DecodeError::BlankProblemId(topic.to_string()));
        }

        Ok(Some(event))
    }

    /// The problem this event is about; `None` for an idle announcement.
    pub fn problem_id(&self) -> Option<&str> {
        match self {
            InboundEvent::Request(submission) => Some(submission.problem_id.as_str()),
            InboundEvent::Response(response) => response.problem_id.as_deref(),
            InboundEvent::Result(result) => Some(result.problem_id.as_str()),
            InboundEvent::Deletion(deleted) => Some(deleted.problem_id.as_str()),
        }
    }
}
