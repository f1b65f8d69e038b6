//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router over a memory store and a memory bus,
//! so tests can drive HTTP requests and then inspect what was published.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tower::ServiceExt;

use solvd_core::{
    config::{AuthConfig, BusBackend, BusConfig, ServerConfig, StoreBackend, StoreConfig},
    create_authenticator,
    worker::{SolverCatalog, SolverModel, SolverWorker, WorkerConfig},
    AuthMethod, Config, HealthProbe, KeyValueStore, MemoryBus, MemoryStore, MessageBus,
    OrchestratorConfig, OrchestratorRunner, Reconciler,
};
use solvd_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use solvd_core::testing::{fixtures, MockSolverEngine};

pub const API_KEY: &str = "test-api-key";

/// In-process server over memory backends.
pub struct TestFixture {
    pub router: Router,
    /// Bus shared with the router; inspect published messages here.
    pub bus: MemoryBus,
    pub store: Arc<dyn KeyValueStore>,
    runner: Option<Arc<OrchestratorRunner>>,
    worker_shutdown: Option<broadcast::Sender<()>>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Protect the API with [`API_KEY`].
    pub api_key: bool,
    /// Run the orchestrator and one mock solver worker behind the router.
    pub with_orchestrator: bool,
}

#[allow(dead_code)]
impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let auth = if test_config.api_key {
            AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some(API_KEY.to_string()),
            }
        } else {
            AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            }
        };

        let config = Config {
            auth,
            server: ServerConfig::default(),
            store: StoreConfig {
                backend: StoreBackend::Memory,
                ..StoreConfig::default()
            },
            bus: BusConfig {
                backend: BusBackend::Memory,
                poll_timeout_ms: 10,
                ..BusConfig::default()
            },
            // The worker announces itself on start; a probe would double that
            orchestrator: OrchestratorConfig {
                probe_workers_on_start: false,
                ..fixtures::orchestrator_config(1)
            },
        };

        let authenticator = create_authenticator(&config.auth).unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let memory_bus = MemoryBus::new();
        let bus: Arc<dyn MessageBus> = Arc::new(memory_bus.clone());

        let (runner, worker_shutdown) = if test_config.with_orchestrator {
            let (runner, shutdown) = start_pipeline(&config, &store, &bus).await;
            (Some(runner), Some(shutdown))
        } else {
            (None, None)
        };

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            Arc::clone(&bus),
            HealthProbe::new(Arc::clone(&store), bus),
            runner.clone(),
        ));

        Self {
            router: create_router(state),
            bus: memory_bus,
            store,
            runner,
            worker_shutdown,
        }
    }

    pub async fn shutdown(self) {
        if let Some(tx) = self.worker_shutdown {
            let _ = tx.send(());
        }
        if let Some(runner) = self.runner {
            runner.stop().await;
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    pub async fn get_as_admin(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, Some(API_KEY)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), None).await
    }

    pub async fn post_as_admin(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), Some(API_KEY)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None, None).await
    }

    /// Raw text body of a GET, for non-JSON endpoints.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        if let Some(key) = api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", key));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

async fn start_pipeline(
    config: &Config,
    store: &Arc<dyn KeyValueStore>,
    bus: &Arc<dyn MessageBus>,
) -> (Arc<OrchestratorRunner>, broadcast::Sender<()>) {
    let reconciler = Arc::new(Reconciler::new(
        config.orchestrator.clone(),
        Arc::clone(store),
        Arc::clone(bus),
    ));
    let runner = Arc::new(OrchestratorRunner::new(
        reconciler,
        Arc::clone(bus),
        config.bus.group_id.clone(),
        Duration::from_millis(config.bus.poll_timeout_ms),
    ));
    runner.start().await.unwrap();

    let worker_config = WorkerConfig {
        poll_timeout_ms: 10,
        ..WorkerConfig::new(1)
    };
    let catalog = SolverCatalog::new().register(Arc::new(MockSolverEngine::new(
        SolverModel::LinearProgramming,
    )));
    let mut worker = SolverWorker::new(worker_config, Arc::clone(bus), catalog);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move { worker.run(shutdown_rx).await });

    (runner, shutdown_tx)
}

/// Poll `condition` for up to five seconds.
#[allow(dead_code)]
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..250 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
