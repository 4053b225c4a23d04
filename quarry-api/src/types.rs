//! Request and Response Types
//!
//! Wire types that exist only at the HTTP layer. Engine types such as
//! `TaskView` and `VerificationResult` are serialized directly.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/check-solution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CheckSolutionRequest {
    /// Id returned by `generate-task`
    #[cfg_attr(feature = "openapi", schema(example = "task_0192f1c4a8e97c3d9b2e4f1a6c8d0e2b"))]
    pub task_id: String,

    /// Candidate SQL, written against the task's logical table name
    #[cfg_attr(feature = "openapi", schema(example = "SELECT * FROM employees WHERE salary > 50000"))]
    pub query: String,
}
