pub mod auth;
pub mod bus;
pub mod config;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod primitives;
pub mod protocol;
pub mod store;
pub mod testing;
pub mod worker;

pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
};
pub use bus::{open_bus, BusError, MemoryBus, MessageBus, SqliteBus};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use health::{HealthProbe, HealthReport, HealthStatus};
pub use orchestrator::{OrchestratorConfig, OrchestratorError, OrchestratorRunner, Reconciler};
pub use protocol::{ProblemDeleted, ProblemSubmission, WorkerId};
pub use store::{open_store, KeyValueStore, MemoryStore, RedisStore, SqliteStore, StoreError};
