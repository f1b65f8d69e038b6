use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solvd_core::{
    create_authenticator, load_config, open_bus, open_store, validate_config, HealthProbe,
    OrchestratorRunner, Reconciler,
};

use solvd_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("solvd {}", VERSION);

    let config_path = std::env::var("SOLVD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);

    let authenticator =
        create_authenticator(&config.auth).context("Failed to create authenticator")?;
    info!("Using authenticator: {}", authenticator.method_name());

    let store = open_store(&config.store).context("Failed to open store")?;
    let bus = open_bus(&config.bus).context("Failed to open message bus")?;
    info!(
        "Store: {} backend, bus: {} backend at {:?}",
        store.backend_name(),
        bus.backend_name(),
        config.bus.path
    );

    let reconciler = Arc::new(Reconciler::new(
        config.orchestrator.clone(),
        Arc::clone(&store),
        Arc::clone(&bus),
    ));
    let runner = Arc::new(OrchestratorRunner::new(
        reconciler,
        Arc::clone(&bus),
        config.bus.group_id.clone(),
        Duration::from_millis(config.bus.poll_timeout_ms),
    ));
    runner
        .start()
        .await
        .context("Failed to start orchestrator")?;

    let health = HealthProbe::new(store, Arc::clone(&bus));
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        bus,
        health,
        Some(Arc::clone(&runner)),
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    runner.stop().await;

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
