//! Health Check Endpoints
//!
//! - /health/ping: plain-text pong
//! - /health/live: the process is serving requests
//! - /health/ready: PostgreSQL answers and the task store can be read

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::db::DbClient;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of probing one dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ComponentCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentCheck {
    fn from_outcome(outcome: Result<(), String>, started: Instant) -> Self {
        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms,
                error: None,
            },
            Err(error) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms,
                error: Some(error),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LivenessReport {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReadinessReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub database: ComponentCheck,
    pub task_store: ComponentCheck,
    /// Tasks the lookup store holds, when it could be counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_stored: Option<usize>,
}

/// Connectivity check against the backing store.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ApiResult<()>;
}

#[async_trait]
impl HealthProbe for DbClient {
    async fn check(&self) -> ApiResult<()> {
        self.health_check().await
    }
}

/// GET /health/ping
#[utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "Service is responding", body = String),
    ),
)]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = LivenessReport),
    ),
)]
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    Json(LivenessReport {
        status: HealthStatus::Healthy,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// GET /health/ready
///
/// Ready only when both the database and the task store answer; composing
/// needs the first and verifying needs both.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessReport),
        (status = 503, description = "A dependency is unavailable", body = ReadinessReport),
    ),
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let database = ComponentCheck::from_outcome(
        state.probe.check().await.map_err(|e| e.message),
        started,
    );

    let started = Instant::now();
    let counted = state.store.len().await;
    let tasks_stored = counted.as_ref().ok().copied();
    let task_store =
        ComponentCheck::from_outcome(counted.map(|_| ()).map_err(|e| e.to_string()), started);

    let status = if database.status == HealthStatus::Healthy
        && task_store.status == HealthStatus::Healthy
    {
        HealthStatus::Healthy
    } else {
        tracing::warn!(
            database = ?database.error,
            task_store = ?task_store.error,
            "Readiness check failed"
        );
        HealthStatus::Unhealthy
    };

    let report = ReadinessReport {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        database,
        task_store,
        tasks_stored,
    };

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(report))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::TaskComposer;
    use crate::error::ApiError;
    use crate::verifier::SolutionVerifier;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use quarry_core::{EngineConfig, ResultSet, StoreError, Task, TaskId, TaskStore};
    use quarry_test_utils::{MockExecutor, MockProvisioner, MockTaskStore};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Probe(bool);

    #[async_trait]
    impl HealthProbe for Probe {
        async fn check(&self) -> ApiResult<()> {
            if self.0 {
                Ok(())
            } else {
                Err(ApiError::service_unavailable("connection refused"))
            }
        }
    }

    struct UnreadableStore;

    #[async_trait]
    impl TaskStore for UnreadableStore {
        async fn insert(&self, _task: Task) -> Result<(), StoreError> {
            Err(StoreError::Backend {
                reason: "relation quarry_tasks does not exist".to_string(),
            })
        }

        async fn get(&self, _id: &TaskId) -> Result<Option<Task>, StoreError> {
            Ok(None)
        }

        async fn len(&self) -> Result<usize, StoreError> {
            Err(StoreError::Backend {
                reason: "relation quarry_tasks does not exist".to_string(),
            })
        }
    }

    fn router(db_up: bool, store: Arc<dyn TaskStore>) -> Router {
        let engine = EngineConfig::default();
        let executor = MockExecutor::new(|_| Ok(ResultSet::default()));
        let composer = TaskComposer::new(Arc::new(MockProvisioner::new()), store.clone(), engine.clone());
        let verifier = SolutionVerifier::new(store.clone(), Arc::new(executor), engine);
        let state = AppState::new(Arc::new(composer), Arc::new(verifier), store, Arc::new(Probe(db_up)));
        create_router(state)
    }

    async fn ready(app: Router) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ready_when_dependencies_answer() {
        let (status, json) = ready(router(true, Arc::new(MockTaskStore::new()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["tasks_stored"], 0);
        assert!(json["database"].get("error").is_none());
    }

    #[tokio::test]
    async fn test_unreadable_store_is_not_ready() {
        let (status, json) = ready(router(true, Arc::new(UnreadableStore))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["database"]["status"], "healthy");
        assert_eq!(json["task_store"]["status"], "unhealthy");
        assert!(json.get("tasks_stored").is_none());
    }

    #[tokio::test]
    async fn test_database_down_reports_probe_message() {
        let (status, json) = ready(router(false, Arc::new(MockTaskStore::new()))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["database"]["error"], "connection refused");
    }

    #[test]
    fn test_component_check_from_outcome() {
        let check = ComponentCheck::from_outcome(Err("timeout".to_string()), Instant::now());
        assert_eq!(check.status, HealthStatus::Unhealthy);
        assert_eq!(check.error.as_deref(), Some("timeout"));
    }
}
