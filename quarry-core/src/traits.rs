//! Seams between the engine and its backing store
//!
//! The core crate never performs I/O. The service layer implements these
//! against PostgreSQL; tests implement them in memory.

use async_trait::async_trait;

use crate::compare::ResultSet;
use crate::error::{ExecError, ProvisionError, StoreError};
use crate::schema::TableArchetype;
use crate::task::{ColumnInfo, TableInstance, Task, TaskId};
use crate::value::Row;

/// Materializes generated rows as a fresh physical table.
#[async_trait]
pub trait InstanceProvisioner: Send + Sync {
    /// Create a uniquely named table for `archetype` and insert `rows`.
    ///
    /// Either the table exists with every row, or the call fails; a partly
    /// filled table is never returned.
    async fn provision(
        &self,
        archetype: &'static TableArchetype,
        rows: &[Row],
    ) -> Result<TableInstance, ProvisionError>;
}

/// Runs read-only statements and reads catalog metadata.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute one statement with no side effects and return its rows as text.
    async fn run_read_only(&self, sql: &str) -> Result<ResultSet, ExecError>;

    /// Column names, types and nullability of `table`, in declaration order.
    async fn schema_of(&self, table: &str) -> Result<Vec<ColumnInfo>, ExecError>;
}

/// Maps task ids to tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Record a task. Storing an id twice is an error.
    async fn insert(&self, task: Task) -> Result<(), StoreError>;

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError>;

    /// Number of stored tasks, for diagnostics.
    async fn len(&self) -> Result<usize, StoreError>;
}
