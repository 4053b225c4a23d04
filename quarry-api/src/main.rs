//! Quarry API Server Entry Point
//!
//! Checks the catalog, bootstraps configuration and the connection pool,
//! and starts the Axum HTTP server.

use std::sync::Arc;

use axum::Router;
use quarry_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbClient, DbConfig,
    InMemoryTaskStore, PgProvisioner, PgTaskStore, SolutionVerifier, TaskComposer,
};
use quarry_core::{check_catalog, EngineConfig, TaskStore, TaskStoreKind};

use quarry_api::telemetry::{init_tracing, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_tracing(&telemetry_config)?;

    let catalog_errors = check_catalog();
    if !catalog_errors.is_empty() {
        for error in &catalog_errors {
            tracing::error!(error = %error, "Catalog inconsistency");
        }
        return Err(ApiError::internal_error(format!(
            "Catalog check failed with {} error(s)",
            catalog_errors.len()
        )));
    }

    let engine_config = EngineConfig::from_env()?;
    let api_config = ApiConfig::from_env()?;
    let db_config = DbConfig::from_env()?;

    let db = DbClient::from_config(&db_config, engine_config.query_timeout)?;

    let store: Arc<dyn TaskStore> = match engine_config.task_store {
        TaskStoreKind::Memory => Arc::new(InMemoryTaskStore::new()),
        TaskStoreKind::Postgres => {
            let store = PgTaskStore::new(db.pool().clone());
            store.ensure_schema().await?;
            Arc::new(store)
        }
    };

    let provisioner = Arc::new(
        PgProvisioner::new(
            db.pool().clone(),
            engine_config.table_prefix.clone(),
            engine_config.query_timeout,
        )
        .with_deadline(engine_config.provision_deadline()),
    );
    let composer = Arc::new(TaskComposer::new(
        provisioner,
        store.clone(),
        engine_config.clone(),
    ));
    let verifier = Arc::new(SolutionVerifier::new(
        store.clone(),
        Arc::new(db.clone()),
        engine_config.clone(),
    ));

    tracing::info!(
        row_count = engine_config.row_count,
        task_store = %engine_config.task_store,
        table_prefix = %engine_config.table_prefix,
        query_timeout_ms = engine_config.query_timeout.as_millis(),
        db_host = %db_config.host,
        db_pool_size = db_config.max_size,
        "Engine configured"
    );

    let state = AppState::new(composer, verifier, store, Arc::new(db));
    let app: Router = create_api_router(state, &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, "Starting Quarry API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
