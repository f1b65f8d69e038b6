//! Read-only health report over the store, the bus and the worker pool.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::bus::MessageBus;
use crate::primitives::{status_map, StatusMap};
use crate::store::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// One line of the detailed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub name: String,
    pub status: String,
}

impl ComponentStatus {
    fn connectivity(name: &str, ok: bool) -> Self {
        Self {
            name: name.to_string(),
            status: if ok { "Connected" } else { "Disconnected" }.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Seconds since the probe was created. Detailed reports only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<ComponentStatus>>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Builds [`HealthReport`]s. Never writes to the store.
pub struct HealthProbe {
    store: Arc<dyn KeyValueStore>,
    bus: Arc<dyn MessageBus>,
    statuses: StatusMap,
    started_at: Instant,
}

impl HealthProbe {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            statuses: status_map(Arc::clone(&store)),
            store,
            bus,
            started_at: Instant::now(),
        }
    }

    /// Overall status; with `detailed`, also uptime, connectivity and the
    /// status of every worker that has announced itself.
    pub async fn check(&self, detailed: bool) -> HealthReport {
        let store_ok = match self.store.ping() {
            Ok(()) => true,
            Err(e) => {
                error!("Store health check failed: {}", e);
                false
            }
        };
        let bus_ok = match self.bus.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!("Bus health check failed: {}", e);
                false
            }
        };

        let mut healthy = store_ok && bus_ok;
        if !detailed {
            return HealthReport {
                status: Self::status(healthy),
                uptime: None,
                components: None,
            };
        }

        let mut components = vec![
            ComponentStatus::connectivity("Store", store_ok),
            ComponentStatus::connectivity("Bus", bus_ok),
        ];

        match self.statuses.get_all() {
            Ok(workers) => {
                components.extend(workers.into_iter().map(|(worker, problem)| {
                    ComponentStatus {
                        name: format!("Solver {}", worker),
                        status: if problem.is_empty() {
                            "IDLE".to_string()
                        } else {
                            problem
                        },
                    }
                }));
            }
            Err(e) => {
                error!("Failed to read worker statuses: {}", e);
                healthy = false;
            }
        }

        HealthReport {
            status: Self::status(healthy),
            uptime: Some(self.started_at.elapsed().as_secs()),
            components: Some(components),
        }
    }

    fn status(healthy: bool) -> HealthStatus {
        if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}
