//! In-process bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{BusConsumer, BusError, BusMessage, MessageBus};

#[derive(Debug, Default)]
struct MemoryLog {
    topics: HashMap<String, Vec<String>>,
    committed: HashMap<(String, String), u64>,
    history: Vec<BusMessage>,
}

struct Shared {
    log: Mutex<MemoryLog>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryLog>, BusError> {
        self.log
            .lock()
            .map_err(|_| BusError::Backend("memory bus lock poisoned".to_string()))
    }
}

/// Bus kept in process memory. Cloning yields another handle to the same bus.
///
/// Besides serving the orchestrator in single-process setups, it records
/// every published message so tests can assert on outbound traffic.
#[derive(Clone)]
pub struct MemoryBus {
    shared: Arc<Shared>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                log: Mutex::new(MemoryLog::default()),
                changes,
            }),
        }
    }

    /// Every message published so far, in publish order.
    pub fn history(&self) -> Vec<BusMessage> {
        self.shared
            .lock()
            .map(|log| log.history.clone())
            .unwrap_or_default()
    }

    /// Payloads published to `topic`, in order.
    pub fn messages(&self, topic: &str) -> Vec<String> {
        self.shared
            .lock()
            .ok()
            .and_then(|log| log.topics.get(topic).cloned())
            .unwrap_or_default()
    }

    /// Payloads published to `topic`, decoded as JSON.
    pub fn json_messages(&self, topic: &str) -> Vec<serde_json::Value> {
        self.messages(topic)
            .iter()
            .filter_map(|payload| serde_json::from_str(payload).ok())
            .collect()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<u64, BusError> {
        let offset = {
            let mut log = self.shared.lock()?;
            let messages = log.topics.entry(topic.to_string()).or_default();
            messages.push(payload.to_string());
            let offset = (messages.len() - 1) as u64;
            log.history.push(BusMessage {
                topic: topic.to_string(),
                offset,
                payload: payload.to_string(),
            });
            offset
        };
        self.shared.changes.send_modify(|seq| *seq += 1);
        Ok(offset)
    }

    async fn subscribe(&self, group: &str, topic: &str) -> Result<Box<dyn BusConsumer>, BusError> {
        let position = self
            .shared
            .lock()?
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0);

        Ok(Box::new(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            changes: self.shared.changes.subscribe(),
            group: group.to_string(),
            topic: topic.to_string(),
            position,
        }))
    }

    async fn ping(&self) -> Result<(), BusError> {
        self.shared.lock().map(|_| ())
    }
}

struct MemoryConsumer {
    shared: Arc<Shared>,
    changes: watch::Receiver<u64>,
    group: String,
    topic: String,
    position: u64,
}

impl MemoryConsumer {
    fn next_available(&mut self) -> Result<Option<BusMessage>, BusError> {
        let log = self.shared.lock()?;
        let payload = log
            .topics
            .get(&self.topic)
            .and_then(|messages| messages.get(self.position as usize))
            .cloned();

        Ok(payload.map(|payload| {
            let message = BusMessage {
                topic: self.topic.clone(),
                offset: self.position,
                payload,
            };
            self.position += 1;
            message
        }))
    }
}

#[async_trait]
impl BusConsumer for MemoryConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Mark the current version seen before looking, so a publish in
            // between still wakes us.
            self.changes.borrow_and_update();
            if let Some(message) = self.next_available()? {
                return Ok(Some(message));
            }
            match tokio::time::timeout_at(deadline, self.changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(BusError::Closed),
                Err(_) => return Ok(None),
            }
        }
    }

    async fn commit(&mut self, message: &BusMessage) -> Result<(), BusError> {
        let mut log = self.shared.lock()?;
        let committed = log
            .committed
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert(0);
        *committed = (*committed).max(message.offset + 1);
        Ok(())
    }

    async fn rewind(&mut self) -> Result<(), BusError> {
        self.position = self
            .shared
            .lock()?
            .committed
            .get(&(self.group.clone(), self.topic.clone()))
            .copied()
            .unwrap_or(0);
        Ok(())
    }

    async fn skip_to_end(&mut self) -> Result<u64, BusError> {
        let mut log = self.shared.lock()?;
        let end = log.topics.get(&self.topic).map_or(0, |messages| messages.len() as u64);
        let committed = log
            .committed
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert(0);
        *committed = (*committed).max(end);

        let skipped = end.saturating_sub(self.position);
        self.position = end;
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_poll_reads_in_order() {
        let bus = MemoryBus::new();
        bus.publish("t", "one").await.unwrap();
        bus.publish("t", "two").await.unwrap();

        let mut consumer = bus.subscribe("g", "t").await.unwrap();
        assert_eq!(consumer.poll(SHORT).await.unwrap().unwrap().payload, "one");
        assert_eq!(consumer.poll(SHORT).await.unwrap().unwrap().payload, "two");
        assert!(consumer.poll(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_poll_wakes_on_publish() {
        let bus = MemoryBus::new();
        let mut consumer = bus.subscribe("g", "t").await.unwrap();

        let producer = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.publish("t", "late").await.unwrap();
        });

        let message = consumer.poll(Duration::from_secs(5)).await.unwrap();
        assert_eq!(message.unwrap().payload, "late");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = MemoryBus::new();
        bus.publish("a", "for-a").await.unwrap();

        let mut consumer = bus.subscribe("g", "b").await.unwrap();
        assert!(consumer.poll(SHORT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rewind_redelivers_uncommitted() {
        let bus = MemoryBus::new();
        bus.publish("t", "first").await.unwrap();
        bus.publish("t", "second").await.unwrap();

        let mut consumer = bus.subscribe("g", "t").await.unwrap();
        let first = consumer.poll(SHORT).await.unwrap().unwrap();
        consumer.commit(&first).await.unwrap();
        let second = consumer.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(second.payload, "second");

        consumer.rewind().await.unwrap();
        let again = consumer.poll(SHORT).await.unwrap().unwrap();
        assert_eq!(again, second);
    }

    #[tokio::test]
    async fn test_new_consumer_resumes_from_commit() {
        let bus = MemoryBus::new();
        for payload in ["a", "b", "c"] {
            bus.publish("t", payload).await.unwrap();
        }

        let mut consumer = bus.subscribe("g", "t").await.unwrap();
        let a = consumer.poll(SHORT).await.unwrap().unwrap();
        consumer.commit(&a).await.unwrap();
        drop(consumer);

        let mut resumed = bus.subscribe("g", "t").await.unwrap();
        assert_eq!(resumed.poll(SHORT).await.unwrap().unwrap().payload, "b");

        let mut other_group = bus.subscribe("h", "t").await.unwrap();
        assert_eq!(other_group.poll(SHORT).await.unwrap().unwrap().payload, "a");
    }

    #[tokio::test]
    async fn test_skip_to_end_commits_backlog_for_group() {
        let bus = MemoryBus::new();
        for payload in ["stale-1", "stale-2"] {
            bus.publish("t", payload).await.unwrap();
        }

        let mut consumer = bus.subscribe("g", "t").await.unwrap();
        assert_eq!(consumer.skip_to_end().await.unwrap(), 2);
        assert_eq!(consumer.skip_to_end().await.unwrap(), 0);
        assert!(consumer.poll(SHORT).await.unwrap().is_none());

        bus.publish("t", "fresh").await.unwrap();
        drop(consumer);

        let mut resumed = bus.subscribe("g", "t").await.unwrap();
        assert_eq!(resumed.poll(SHORT).await.unwrap().unwrap().payload, "fresh");

        let mut other_group = bus.subscribe("h", "t").await.unwrap();
        assert_eq!(other_group.poll(SHORT).await.unwrap().unwrap().payload, "stale-1");
    }

    #[tokio::test]
    async fn test_history_spans_topics() {
        let bus = MemoryBus::new();
        bus.publish("x", r#"{"n":1}"#).await.unwrap();
        bus.publish("y", r#"{"n":2}"#).await.unwrap();

        let topics: Vec<String> = bus.history().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["x", "y"]);
        assert_eq!(bus.json_messages("y")[0]["n"], 2);
        assert!(bus.messages("z").is_empty());
    }
}
