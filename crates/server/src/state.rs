use std::sync::Arc;

use solvd_core::{Authenticator, Config, HealthProbe, MessageBus, OrchestratorRunner, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    bus: Arc<dyn MessageBus>,
    health: HealthProbe,
    runner: Option<Arc<OrchestratorRunner>>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        bus: Arc<dyn MessageBus>,
        health: HealthProbe,
        runner: Option<Arc<OrchestratorRunner>>,
    ) -> Self {
        Self {
            config,
            authenticator,
            bus,
            health,
            runner,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    /// Bus used by the ingress endpoints to publish submissions and deletions.
    pub fn bus(&self) -> &dyn MessageBus {
        self.bus.as_ref()
    }

    pub fn health(&self) -> &HealthProbe {
        &self.health
    }

    pub fn runner(&self) -> Option<&Arc<OrchestratorRunner>> {
        self.runner.as_ref()
    }
}
