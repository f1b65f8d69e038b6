//! Bus topics and the JSON messages exchanged on them.

mod messages;
pub mod topics;

pub use messages::{
    DecodeError, InboundEvent, ProblemDeleted, ProblemResult, ProblemSubmission, ResendAdvisory,
    ResponseKind, StatusProbe, WorkerId, WorkerResponse,
};
