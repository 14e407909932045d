/// Server setup and initialization
///
/// Wires together all components: storage, registry, state store, engine,
/// event hub, and HTTP routes. Provides the application factory used by
/// main and by integration tests.

use crate::{
    api::{
        events::create_event_routes, runs::create_run_routes,
        workflows::create_workflow_routes, AppState,
    },
    config::Config,
    runtime::{engine::Engine, events::EventHub, runlog::TracingRunLog},
    state::StateStore,
    workflow::{registry::StepRegistry, storage::WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)?;

    tracing::info!("📋 Initializing workflow storage");
    let options = SqliteConnectOptions::from_str(&config.database.url())?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    let storage = WorkflowStorage::new(pool);
    storage.init_schema().await?;

    tracing::info!("📥 Loading workflows from storage");
    let registry = Arc::new(StepRegistry::new());
    registry.init_from_storage(&storage).await?;

    tracing::info!("🚀 Initializing orchestration engine");
    let store = Arc::new(StateStore::new());
    let events = Arc::new(EventHub::new());
    let engine = Arc::new(Engine::new(
        registry.clone(),
        store.clone(),
        events.clone(),
        Arc::new(TracingRunLog),
        config.engine.clone(),
    ));

    let app_state = AppState {
        storage,
        registry,
        store,
        engine,
        events,
    };

    let app = Router::new()
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes().with_state(app_state.clone()))
        .merge(create_run_routes().with_state(app_state.clone()))
        .merge(create_event_routes().with_state(app_state));

    tracing::info!("✅ Application initialized");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Stepway server...");

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
