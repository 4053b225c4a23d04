//! Shared application state for Axum routers.

use std::sync::Arc;

use quarry_core::TaskStore;

use crate::composer::TaskComposer;
use crate::routes::health::HealthProbe;
use crate::verifier::SolutionVerifier;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub composer: Arc<TaskComposer>,
    pub verifier: Arc<SolutionVerifier>,
    /// Task lookup store, shared with composer and verifier.
    pub store: Arc<dyn TaskStore>,
    /// Backing-store connectivity check used by readiness.
    pub probe: Arc<dyn HealthProbe>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        composer: Arc<TaskComposer>,
        verifier: Arc<SolutionVerifier>,
        store: Arc<dyn TaskStore>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            composer,
            verifier,
            store,
            probe,
            start_time: std::time::Instant::now(),
        }
    }
}
