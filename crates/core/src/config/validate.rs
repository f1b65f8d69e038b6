use super::{
    types::{AuthMethod, BusBackend, Config, StoreBackend},
    ConfigError,
};

/// Validate configuration.
///
/// Any failure here is fatal at startup.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().map_or(true, str::is_empty)
    {
        return Err(ConfigError::ValidationError(
            "auth.api_key must be set when auth.method = \"api_key\"".to_string(),
        ));
    }

    if config.store.backend == StoreBackend::Sqlite && config.store.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.path cannot be empty for the sqlite backend".to_string(),
        ));
    }

    if config.store.backend == StoreBackend::Redis {
        let url = config.store.url.as_str();
        let known_scheme = ["redis://", "rediss://", "unix://", "redis+unix://"]
            .iter()
            .any(|scheme| url.starts_with(scheme));
        if !known_scheme {
            return Err(ConfigError::ValidationError(format!(
                "store.url must be a redis://, rediss:// or unix:// URL for the redis backend, got {:?}",
                config.store.redacted().url
            )));
        }
    }

    if config.bus.backend == BusBackend::Sqlite && config.bus.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "bus.path cannot be empty for the sqlite backend".to_string(),
        ));
    }

    if config.bus.group_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "bus.group_id cannot be empty".to_string(),
        ));
    }

    if config.bus.poll_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "bus.poll_timeout_ms must be greater than 0".to_string(),
        ));
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.workers == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.workers must be at least 1".to_string(),
        ));
    }
    if orchestrator.deleted_retention_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.deleted_retention_secs must be greater than 0".to_string(),
        ));
    }
    if orchestrator.executed_retention_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.executed_retention_secs must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
