//! OpenAPI Specification for the Quarry API
//!
//! Generated from the route annotations and wire types with utoipa.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::{health, task};
use crate::telemetry::metrics;
use crate::types::CheckSolutionRequest;

use quarry_core::{ColumnInfo, Difficulty, TaskView, VerificationResult};

/// OpenAPI document for the Quarry API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Quarry API",
        version = "0.1.0",
        description = "SQL practice tasks on freshly generated tables, with automatic solution checking",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Tasks", description = "Task generation and solution checking"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        // === Task Routes ===
        task::generate_task,
        task::check_solution,
        task::task_schema,

        // === Health Routes ===
        health::ping,
        health::liveness,
        health::readiness,

        // === Observability ===
        metrics::metrics_handler,
    ),
    components(
        schemas(
            // === Error Types ===
            ApiError, ErrorCode,

            // === Task Types ===
            TaskView, Difficulty, CheckSolutionRequest, VerificationResult, ColumnInfo,

            // === Health Types ===
            health::HealthStatus, health::ComponentCheck, health::LivenessReport,
            health::ReadinessReport,
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        let openapi = Self::openapi();
        serde_json::to_string_pretty(&openapi)
    }

    /// Generate OpenAPI spec as YAML string.
    #[cfg(feature = "openapi")]
    pub fn to_yaml() -> Result<String, String> {
        let openapi = Self::openapi();
        serde_yaml::to_string(&openapi).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() -> Result<(), String> {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "Quarry API");
        assert_eq!(openapi.info.version, "0.1.0");

        let components = openapi
            .components
            .as_ref()
            .ok_or_else(|| "OpenAPI components missing".to_string())?;
        assert!(components.schemas.contains_key("TaskView"));
        assert!(components.schemas.contains_key("CheckSolutionRequest"));
        assert!(components.schemas.contains_key("ApiError"));
        Ok(())
    }

    #[test]
    fn test_openapi_json_serialization() -> Result<(), String> {
        let json = ApiDoc::to_json().map_err(|e| format!("Failed to serialize OpenAPI: {}", e))?;
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| format!("Generated JSON invalid: {}", e))?;
        assert!(json.contains("Quarry API"));
        Ok(())
    }

    #[test]
    fn test_openapi_paths_exist() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;
        assert!(paths.contains_key("/api/v1/generate-task"));
        assert!(paths.contains_key("/api/v1/check-solution"));
        assert!(paths.contains_key("/api/v1/tasks/{id}/schema"));
        assert!(paths.contains_key("/health/ready"));
        assert!(paths.contains_key("/metrics"));
    }
}
