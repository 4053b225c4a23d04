//! Task REST API Routes
//!
//! Generate a practice task, check a candidate solution against it, and
//! describe the columns of its table.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use quarry_core::{ColumnInfo, TaskId, TaskView, VerificationResult};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    types::CheckSolutionRequest,
};

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/generate-task - Compose a new practice task
#[utoipa::path(
    get,
    path = "/api/v1/generate-task",
    tag = "Tasks",
    responses(
        (status = 200, description = "A freshly composed task", body = TaskView),
        (status = 503, description = "No practice table could be prepared", body = ApiError),
        (status = 504, description = "Composition timed out", body = ApiError),
    ),
)]
pub async fn generate_task(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let view = state.composer.compose().await?;
    Ok(Json(view))
}

/// POST /api/v1/check-solution - Check a candidate query
///
/// Wrong or refused queries are a normal 200 response with `correct: false`.
#[utoipa::path(
    post,
    path = "/api/v1/check-solution",
    tag = "Tasks",
    request_body = CheckSolutionRequest,
    responses(
        (status = 200, description = "Verdict for the candidate query", body = VerificationResult),
        (status = 400, description = "Malformed body or empty query", body = ApiError),
        (status = 404, description = "Unknown task", body = ApiError),
        (status = 500, description = "The task could not be checked", body = ApiError),
    ),
)]
pub async fn check_solution(
    State(state): State<AppState>,
    payload: Result<Json<CheckSolutionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;

    if req.task_id.trim().is_empty() {
        return Err(ApiError::missing_field("task_id"));
    }
    if req.query.trim().is_empty() {
        return Err(ApiError::missing_field("query"));
    }

    let task_id = TaskId::from(req.task_id.trim());
    let result = state.verifier.verify(&task_id, &req.query).await?;
    Ok(Json(result))
}

/// GET /api/v1/tasks/{id}/schema - Columns of the task's table
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/schema",
    tag = "Tasks",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Columns in declaration order", body = Vec<ColumnInfo>),
        (status = 404, description = "Unknown task", body = ApiError),
    ),
)]
pub async fn task_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let columns = state.verifier.schema_for(&TaskId::from(id)).await?;
    Ok(Json(columns))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the task router, mounted under `/api/v1`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/generate-task", get(generate_task))
        .route("/check-solution", post(check_solution))
        .route("/tasks/:id/schema", get(task_schema))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::TaskComposer;
    use crate::routes::health::HealthProbe;
    use crate::verifier::SolutionVerifier;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use quarry_core::{EngineConfig, TaskStore};
    use quarry_test_utils::{MockExecutor, MockProvisioner, MockTaskStore};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct AlwaysUp;

    #[async_trait]
    impl HealthProbe for AlwaysUp {
        async fn check(&self) -> ApiResult<()> {
            Ok(())
        }
    }

    fn app() -> (Router, Arc<MockTaskStore>, MockExecutor) {
        let store = Arc::new(MockTaskStore::new());
        let executor = MockExecutor::new(|_| {
            Ok(quarry_core::ResultSet::new(
                vec!["n".to_string()],
                vec![vec![Some("1".to_string())]],
            ))
        });
        let config = EngineConfig::default();
        let composer = TaskComposer::new(Arc::new(MockProvisioner::new()), store.clone(), config.clone());
        let verifier = SolutionVerifier::new(store.clone(), Arc::new(executor.clone()), config);
        let state = AppState::new(
            Arc::new(composer),
            Arc::new(verifier),
            store.clone(),
            Arc::new(AlwaysUp),
        );
        (Router::new().nest("/api/v1", create_router(state)), store, executor)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn check_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/check-solution")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_task_returns_view() {
        let (app, store, _) = app();
        let response = app
            .oneshot(Request::get("/api/v1/generate-task").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let id = json["id"].as_str().unwrap().to_string();
        assert!(id.starts_with("task_"));
        assert!(json["description"].as_str().is_some());
        assert!(json.get("reference_query").is_none());
        assert!(json.get("table_name").is_none());

        let task = store.get(&TaskId::from(id)).await.unwrap().unwrap();
        assert_eq!(json["table"], task.kind.logical_name());
    }

    #[tokio::test]
    async fn test_check_solution_round_trip() {
        let (app, _, _) = app();
        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/generate-task").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(check_request(&format!(
                r#"{{"task_id":"{}","query":"SELECT 1 AS n"}}"#,
                id
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["correct"], true);
        assert_eq!(json["message"], "Correct!");
    }

    #[tokio::test]
    async fn test_check_solution_unknown_task_is_404() {
        let (app, _, _) = app();
        let response = app
            .oneshot(check_request(r#"{"task_id":"task_missing","query":"SELECT 1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "TASK_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_check_solution_malformed_body_is_400() {
        let (app, _, executor) = app();
        let response = app.oneshot(check_request("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "INVALID_INPUT");
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_check_solution_empty_query_is_400() {
        let (app, _, _) = app();
        let response = app
            .oneshot(check_request(r#"{"task_id":"task_1","query":"   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_task_schema_unknown_task_is_404() {
        let (app, _, _) = app();
        let response = app
            .oneshot(
                Request::get("/api/v1/tasks/task_missing/schema")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
