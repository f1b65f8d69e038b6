//! Event loop and its lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{BusConsumer, BusMessage, MessageBus};
use crate::metrics::EVENTS_TOTAL;
use crate::protocol::{topics, InboundEvent};

use super::engine::Reconciler;
use super::types::{OrchestratorError, RoundSummary};

/// Outcome of one bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Handled,
    Skipped,
    Failed,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Handled => "handled",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        }
    }
}

/// Round-robin consumer of the orchestrator's inbound topics.
///
/// One message is fully applied, committed and followed by a backlog drain
/// before the next consumer is polled.
pub struct EventLoop {
    reconciler: Arc<Reconciler>,
    consumers: Vec<Box<dyn BusConsumer>>,
    poll_timeout: Duration,
}

impl EventLoop {
    /// Subscribe to every inbound topic as consumer group `group`.
    pub async fn subscribe(
        reconciler: Arc<Reconciler>,
        bus: &dyn MessageBus,
        group: &str,
        poll_timeout: Duration,
    ) -> Result<Self, OrchestratorError> {
        let mut consumers = Vec::with_capacity(topics::ORCHESTRATOR_INBOUND.len());
        for topic in topics::ORCHESTRATOR_INBOUND {
            consumers.push(bus.subscribe(group, topic).await?);
        }

        Ok(Self {
            reconciler,
            consumers,
            poll_timeout,
        })
    }

    /// Poll each consumer once.
    pub async fn poll_round(&mut self) -> RoundSummary {
        let mut summary = RoundSummary::default();

        for consumer in self.consumers.iter_mut() {
            let message = match consumer.poll(self.poll_timeout).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(e) => {
                    error!("Failed to poll {}: {}", consumer.topic(), e);
                    continue;
                }
            };

            let outcome = Self::process(&self.reconciler, consumer.as_mut(), &message).await;
            EVENTS_TOTAL
                .with_label_values(&[message.topic.as_str(), outcome.as_str()])
                .inc();

            match outcome {
                Outcome::Handled => summary.handled += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        summary
    }

    async fn process(
        reconciler: &Reconciler,
        consumer: &mut dyn BusConsumer,
        message: &BusMessage,
    ) -> Outcome {
        let event = match InboundEvent::decode(&message.topic, &message.payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(
                    "Skipping null message at {}:{}",
                    message.topic, message.offset
                );
                Self::commit(consumer, message).await;
                return Outcome::Skipped;
            }
            Err(e) => {
                error!(
                    "Skipping undecodable message at {}:{}: {}",
                    message.topic, message.offset, e
                );
                Self::commit(consumer, message).await;
                return Outcome::Skipped;
            }
        };

        debug!("Handling {}:{}", message.topic, message.offset);
        if let Err(e) = reconciler.handle(event).await {
            error!(
                "Failed to handle message at {}:{}, will retry: {}",
                message.topic, message.offset, e
            );
            if let Err(e) = consumer.rewind().await {
                error!("Failed to rewind {}: {}", message.topic, e);
            }
            return Outcome::Failed;
        }

        Self::commit(consumer, message).await;

        if let Err(e) = reconciler.process_backlog().await {
            error!("Failed to drain backlog: {}", e);
        }
        Outcome::Handled
    }

    async fn commit(consumer: &mut dyn BusConsumer, message: &BusMessage) {
        if let Err(e) = consumer.commit(message).await {
            error!(
                "Failed to commit {}:{}: {}",
                message.topic, message.offset, e
            );
        }
    }
}

/// Owns the event loop task.
pub struct OrchestratorRunner {
    reconciler: Arc<Reconciler>,
    bus: Arc<dyn MessageBus>,
    group: String,
    poll_timeout: Duration,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OrchestratorRunner {
    pub fn new(
        reconciler: Arc<Reconciler>,
        bus: Arc<dyn MessageBus>,
        group: impl Into<String>,
        poll_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            reconciler,
            bus,
            group: group.into(),
            poll_timeout,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Subscribe, probe the workers, resume any backlog left by a previous
    /// run and spawn the event loop.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return Ok(());
        }

        info!(
            "Starting orchestrator for {} workers (group {})",
            self.reconciler.config().workers,
            self.group
        );

        let mut event_loop = match self.prepare().await {
            Ok(event_loop) => event_loop,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Event loop started");
            loop {
                // Checked between rounds so a handler is never cut short
                match shutdown_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    _ => {
                        info!("Event loop received shutdown signal");
                        break;
                    }
                }
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let summary = event_loop.poll_round().await;
                if summary.total() > 0 {
                    debug!(
                        "Round: {} handled, {} skipped, {} failed",
                        summary.handled, summary.skipped, summary.failed
                    );
                }
            }
            info!("Event loop stopped");
        });

        *self.task.lock().await = Some(handle);
        info!("Orchestrator started");
        Ok(())
    }

    async fn prepare(&self) -> Result<EventLoop, OrchestratorError> {
        let event_loop = EventLoop::subscribe(
            Arc::clone(&self.reconciler),
            self.bus.as_ref(),
            &self.group,
            self.poll_timeout,
        )
        .await?;

        if self.reconciler.config().probe_workers_on_start {
            self.reconciler.probe_workers().await?;
        }
        self.reconciler.process_backlog().await?;

        Ok(event_loop)
    }

    /// Stop the event loop after its current round.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping orchestrator");
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Event loop task failed: {}", e);
            }
        }

        info!("Orchestrator stopped");
    }
}
