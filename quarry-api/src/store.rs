//! Task Lookup Stores
//!
//! Two implementations of [`TaskStore`]: a process-local concurrent map and
//! a PostgreSQL table that survives restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use deadpool_postgres::Pool;
use quarry_core::{Difficulty, StoreError, TableKind, Task, TaskId, TaskStore};
use tokio_postgres::error::SqlState;

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Concurrent in-process store. Tasks are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<TaskId, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        match self.tasks.entry(task.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId {
                id: task.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(())
            }
        }
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.get(id).map(|entry| entry.value().clone()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.tasks.len())
    }
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

const CREATE_TASKS_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS quarry_tasks (
    id TEXT PRIMARY KEY,
    table_name TEXT NOT NULL,
    archetype TEXT NOT NULL,
    template TEXT NOT NULL,
    description TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    reference_query TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
)";

/// Store backed by the `quarry_tasks` table.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: Pool,
}

impl PgTaskStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await.map_err(backend)?;
        conn.batch_execute(CREATE_TASKS_TABLE)
            .await
            .map_err(backend)?;
        tracing::debug!("quarry_tasks table ready");
        Ok(())
    }
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend {
        reason: err.to_string(),
    }
}

fn corrupt(id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        id: id.to_string(),
        reason: reason.into(),
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        let conn = self.pool.get().await.map_err(backend)?;
        let archetype = task.kind.to_string();
        let difficulty = task.difficulty.to_string();

        conn.execute(
            "INSERT INTO quarry_tasks \
             (id, table_name, archetype, template, description, difficulty, reference_query, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &task.id.as_str(),
                &task.table_name,
                &archetype,
                &task.template,
                &task.description,
                &difficulty,
                &task.reference_query,
                &task.created_at,
            ],
        )
        .await
        .map_err(|e| {
            if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                StoreError::DuplicateId {
                    id: task.id.to_string(),
                }
            } else {
                tracing::error!(task_id = %task.id, error = ?e, "Failed to persist task");
                backend(e)
            }
        })?;

        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let conn = self.pool.get().await.map_err(backend)?;
        let row = conn
            .query_opt(
                "SELECT table_name, archetype, template, description, difficulty, reference_query, created_at \
                 FROM quarry_tasks WHERE id = $1",
                &[&id.as_str()],
            )
            .await
            .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let archetype: String = row.get(1);
        let difficulty: String = row.get(4);
        let created_at: DateTime<Utc> = row.get(6);

        let kind: TableKind = archetype
            .parse()
            .map_err(|e: String| corrupt(id.as_str(), e))?;
        let difficulty: Difficulty = difficulty
            .parse()
            .map_err(|e: String| corrupt(id.as_str(), e))?;

        Ok(Some(Task {
            id: id.clone(),
            table_name: row.get(0),
            kind,
            template: row.get(2),
            description: row.get(3),
            difficulty,
            created_at,
            reference_query: row.get(5),
        }))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let conn = self.pool.get().await.map_err(backend)?;
        let row = conn
            .query_one("SELECT COUNT(*) FROM quarry_tasks", &[])
            .await
            .map_err(backend)?;
        let count: i64 = row.get(0);
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn task(id: &str) -> Task {
        Task {
            id: TaskId::from(id),
            description: "List every employee".to_string(),
            table_name: "practice_1_0".to_string(),
            kind: TableKind::Employees,
            template: "all_employees".to_string(),
            difficulty: Difficulty::Easy,
            created_at: Utc::now(),
            reference_query: "SELECT * FROM practice_1_0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = InMemoryTaskStore::new();
        store.insert(task("task_a")).await.unwrap();

        let found = store.get(&TaskId::from("task_a")).await.unwrap();
        assert_eq!(found.map(|t| t.table_name), Some("practice_1_0".to_string()));
        assert_eq!(store.get(&TaskId::from("task_b")).await.unwrap(), None);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_first() {
        let store = InMemoryTaskStore::new();
        store.insert(task("task_a")).await.unwrap();

        let mut second = task("task_a");
        second.table_name = "practice_2_0".to_string();
        let err = store.insert(second).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateId {
                id: "task_a".to_string()
            }
        );

        let kept = store.get(&TaskId::from("task_a")).await.unwrap().unwrap();
        assert_eq!(kept.table_name, "practice_1_0");
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let store = Arc::new(InMemoryTaskStore::new());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.insert(task(&format!("task_{}", i))).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.len().await.unwrap(), 32);
    }
}
