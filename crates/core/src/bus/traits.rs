use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Transport failure.
    #[error("bus backend error: {0}")]
    Backend(String),

    /// The bus the consumer belongs to is gone.
    #[error("bus closed")]
    Closed,

    /// A message could not be serialized for publishing.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for BusError {
    fn from(e: rusqlite::Error) -> Self {
        BusError::Backend(e.to_string())
    }
}

/// A message read from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    /// Position in the topic log, starting at 0.
    pub offset: u64,
    pub payload: String,
}

/// Producer side of the bus and factory for consumers.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Backend name for logging and health output.
    fn backend_name(&self) -> &'static str;

    /// Append a payload to a topic, returning its offset.
    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, BusError>;

    /// Open a consumer on `topic` for consumer group `group`.
    ///
    /// A group with no committed offset starts from the earliest message.
    async fn subscribe(&self, group: &str, topic: &str) -> Result<Box<dyn BusConsumer>, BusError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), BusError>;
}

/// A single-topic consumer belonging to a consumer group.
#[async_trait]
pub trait BusConsumer: Send {
    fn topic(&self) -> &str;

    /// Next message after the current position, waiting at most `timeout`.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError>;

    /// Record `message` as handled for the group.
    async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError>;

    /// Move the position back to the group's committed offset.
    async fn rewind(&mut self) -> Result<(), BusError>;

    /// Commit everything currently in the topic without delivering it.
    /// Returns how many messages were passed over.
    async fn skip_to_end(&mut self) -> Result<u64, BusError>;
}

/// Serialize `message` as JSON and publish it.
pub async fn publish_json<T>(bus: &dyn MessageBus, topic: &str, message: &T) -> Result<u64, BusError>
where
    T: Serialize + Sync,
{
    let payload = serde_json::to_string(message)?;
    bus.publish(topic, &payload).await
}
