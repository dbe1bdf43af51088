use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deckbatch_core::{
    create_mirror_system, load_config, validate_config, webhook_registry, BatchOrchestrator,
    SqliteDocumentMirror,
};
use deckbatch_server::{api::create_router, state::AppState};

/// Reason recorded on jobs still active when the server stops
const SHUTDOWN_REASON: &str = "server shutting down";

/// Upper bound on draining queued mirror writes at shutdown
const MIRROR_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

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

    // Determine config path
    let config_path = std::env::var("DECKBATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = config_hash[..16].to_string();
    info!(config_hash = %config_hash_short, "Configuration hash computed");

    // Create SQLite mirror and its background writer
    let mirror_store = Arc::new(
        SqliteDocumentMirror::new(&config.database.path)
            .context("Failed to create job mirror")?,
    );
    let (mirror_handle, mirror_writer) =
        create_mirror_system(mirror_store, config.batch.mirror_buffer);
    let writer_handle = tokio::spawn(mirror_writer.run());
    info!("Job mirror initialized");

    // Register processors
    let processors =
        webhook_registry(&config.webhooks).context("Failed to create webhook processors")?;
    if processors.is_empty() {
        warn!("No webhooks configured, job submissions will be rejected");
    } else {
        info!("Registered job types: {}", processors.job_types().join(", "));
    }

    // Create orchestrator
    let orchestrator = Arc::new(
        BatchOrchestrator::from_config(&config.batch).with_mirror(mirror_handle),
    );
    orchestrator.start().await;
    info!("Batch orchestrator started");

    let addr = SocketAddr::new(config.server.host, config.server.port);

    // Create app state
    let state = Arc::new(AppState::new(
        config,
        config_hash_short,
        Arc::clone(&orchestrator),
        processors,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    orchestrator.stop().await;
    let cancelled = orchestrator.cancel_active_jobs(SHUTDOWN_REASON).await;
    if cancelled > 0 {
        info!("Cancelled {} active job(s)", cancelled);
    }

    // The orchestrator and its runners hold MirrorHandle clones; the writer
    // exits once the last one is dropped.
    drop(orchestrator);

    match tokio::time::timeout(MIRROR_DRAIN_TIMEOUT, writer_handle).await {
        Ok(_) => info!("Mirror writer stopped"),
        Err(_) => warn!("Mirror writer did not drain within {:?}", MIRROR_DRAIN_TIMEOUT),
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
