use std::sync::Arc;
use std::time::Duration;

use quarry_api::{DbClient, DbConfig, InMemoryTaskStore, PgProvisioner, SolutionVerifier};
use quarry_core::{EngineConfig, TaskStore};

pub fn test_db_client() -> DbClient {
    let config = DbConfig::from_env().expect("Invalid database configuration");
    DbClient::from_config(&config, Duration::from_secs(5)).expect("Failed to create database client")
}

pub fn test_provisioner(db: &DbClient) -> PgProvisioner {
    PgProvisioner::new(db.pool().clone(), "quarry_test", Duration::from_secs(15))
}

/// Verifier over an in-memory store, returned with the store so tests can
/// register tasks directly.
pub fn test_verifier(db: &DbClient) -> (SolutionVerifier, Arc<dyn TaskStore>) {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let verifier = SolutionVerifier::new(store.clone(), Arc::new(db.clone()), EngineConfig::default());
    (verifier, store)
}
