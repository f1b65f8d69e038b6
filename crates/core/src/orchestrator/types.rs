//! Types for the orchestrator.

use serde::Serialize;
use thiserror::Error;

use crate::bus::BusError;
use crate::protocol::DecodeError;
use crate::store::StoreError;

/// Errors that can occur while handling an event.
///
/// Any of these leaves the triggering message uncommitted so it is delivered
/// again.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Durable store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Message bus error.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// Inbound message could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What one polling round over the inbound topics did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    /// Messages handled and committed.
    pub handled: usize,
    /// Messages committed without handling (null or undecodable).
    pub skipped: usize,
    /// Messages left uncommitted for redelivery.
    pub failed: usize,
}

impl RoundSummary {
    pub fn total(&self) -> usize {
        self.handled + self.skipped + self.failed
    }
}
