//! Task, instance and verification types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::schema::TableKind;
use crate::template::Difficulty;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Opaque task identifier, `task_` followed by a UUIDv7 so ids sort by
/// creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        TaskId(format!("task_{}", Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        TaskId(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(s.to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provisioned physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInstance {
    /// Validated physical name, safe to interpolate as an identifier.
    pub name: String,
    pub kind: TableKind,
    pub row_count: usize,
}

/// A composed task. The reference query never leaves the engine; use
/// [`Task::view`] for anything learner-facing.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub table_name: String,
    pub kind: TableKind,
    pub template: String,
    pub difficulty: Difficulty,
    pub created_at: Timestamp,
    pub reference_query: String,
}

impl Task {
    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            created_at: self.created_at,
            table: self.kind.logical_name().to_string(),
        }
    }
}

/// Learner-facing representation of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TaskView {
    #[cfg_attr(feature = "openapi", schema(value_type = String, example = "task_0192f1c4a8e97c3d9b2e4f1a6c8d0e2b"))]
    pub id: TaskId,
    pub description: String,
    pub difficulty: Difficulty,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    /// Logical table name to use in queries.
    #[cfg_attr(feature = "openapi", schema(example = "employees"))]
    pub table: String,
}

/// Outcome of checking a candidate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VerificationResult {
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerificationResult {
    pub fn correct() -> Self {
        Self {
            correct: true,
            message: Some("Correct!".to_string()),
        }
    }

    pub fn incorrect(message: impl Into<String>) -> Self {
        Self {
            correct: false,
            message: Some(message.into()),
        }
    }
}

/// One column as reported by the store's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}
