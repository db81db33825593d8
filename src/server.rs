/// Server setup and initialization
///
/// Wires together all components: storage, registry, handlers, executor,
/// scheduler, broadcaster and HTTP routes. Provides the main application
/// factory function for creating the Axum app.

use crate::{
    api::{create_event_routes, create_trigger_routes, create_workflow_routes, AppState},
    config::Config,
    realtime::EventBroadcaster,
    runtime::{HandlerRegistry, SchedulerService, WorkflowExecutor},
    workflow::{registry::WorkflowRegistry, storage::EngineStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes wired up
pub async fn create_app(config: Config) -> Result<Router> {
    // Ensure the database directory exists before sqlite opens the file
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create data directory '{}': {}", parent.display(), e)
            })?;
        }
    }

    tracing::info!("🗄️ Opening database: {}", config.database.path);
    let options = SqliteConnectOptions::new()
        .filename(&config.database.path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;

    let storage = EngineStorage::new(pool);
    storage.init_schema().await?;

    // Load every stored workflow into the hot-reload registry
    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(storage.clone()));
    registry.init_from_storage().await?;

    let broadcaster = Arc::new(EventBroadcaster::new());

    tracing::info!("⚙️ Initializing node handlers");
    let handlers = Arc::new(HandlerRegistry::with_builtins(Arc::clone(&broadcaster)));

    let executor = Arc::new(WorkflowExecutor::new(
        Arc::clone(&registry),
        Arc::clone(&handlers),
        storage.clone(),
        Arc::clone(&broadcaster),
    ));

    tracing::info!("⏰ Initializing scheduler service");
    let scheduler = Arc::new(SchedulerService::new(Arc::clone(&executor), storage.clone()).await?);

    // Start the recurring sweep in the background
    let scheduler_clone = Arc::clone(&scheduler);
    tokio::spawn(async move {
        if let Err(e) = scheduler_clone.start().await {
            tracing::error!("❌ Failed to start scheduler: {}", e);
        }
    });

    let app_state = AppState {
        storage,
        registry,
        executor,
        scheduler,
        broadcaster,
        sweep_secret: config.scheduler.sweep_secret.clone(),
    };

    tracing::info!("📡 Creating HTTP router");
    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_trigger_routes())
        .merge(create_event_routes())
        .with_state(app_state);

    tracing::info!("✅ Application initialized successfully");

    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Pulseflow server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
