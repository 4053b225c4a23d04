//! Quarry Test Utilities
//!
//! Shared test infrastructure for the Quarry workspace:
//! - Proptest generators for engine types
//! - Mock implementations of the storage seams
//! - Fixtures with pinned time and randomness
//! - Custom assertions for verification outcomes

pub use quarry_core::{
    archetype, ColumnInfo, ExecError, InstanceProvisioner, ProvisionError, ProvisionStage,
    QueryExecutor, ResultSet, Row, StoreError, TableArchetype, TableInstance, TableKind, Task,
    TaskId, TaskPlan, TaskStore, VerificationResult,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// MOCK SEAMS
// ============================================================================

/// Provisioner that records what it was asked to create and never touches a
/// database.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    seq: AtomicU64,
    fail_at: Option<ProvisionStage>,
    provisioned: Mutex<Vec<(TableInstance, usize)>>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call at `stage`.
    pub fn failing_at(stage: ProvisionStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    /// Tables created so far, with the number of rows inserted into each.
    pub fn provisioned(&self) -> Vec<(TableInstance, usize)> {
        self.provisioned
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InstanceProvisioner for MockProvisioner {
    async fn provision(
        &self,
        archetype: &'static TableArchetype,
        rows: &[Row],
    ) -> Result<TableInstance, ProvisionError> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let name = format!("mock_{}_{}", archetype.kind, n);
        if let Some(stage) = self.fail_at {
            return Err(ProvisionError::failed(stage, &name, "injected failure"));
        }
        let instance = TableInstance {
            name,
            kind: archetype.kind,
            row_count: rows.len(),
        };
        if let Ok(mut guard) = self.provisioned.lock() {
            guard.push((instance.clone(), rows.len()));
        }
        Ok(instance)
    }
}

type Handler = dyn Fn(&str) -> Result<ResultSet, ExecError> + Send + Sync;

/// Executor answering from a closure and recording every statement.
#[derive(Clone)]
pub struct MockExecutor {
    handler: Arc<Handler>,
    schemas: Arc<Mutex<HashMap<String, Vec<ColumnInfo>>>>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl MockExecutor {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Result<ResultSet, ExecError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            schemas: Arc::new(Mutex::new(HashMap::new())),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_schema(self, table: &str, columns: Vec<ColumnInfo>) -> Self {
        if let Ok(mut guard) = self.schemas.lock() {
            guard.insert(table.to_string(), columns);
        }
        self
    }

    /// Statements run so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn run_read_only(&self, sql: &str) -> Result<ResultSet, ExecError> {
        if let Ok(mut guard) = self.executed.lock() {
            guard.push(sql.to_string());
        }
        (self.handler)(sql)
    }

    async fn schema_of(&self, table: &str) -> Result<Vec<ColumnInfo>, ExecError> {
        self.schemas
            .lock()
            .map_err(|e| ExecError::Backend {
                reason: e.to_string(),
            })
            .map(|guard| guard.get(table).cloned().unwrap_or_default())
    }
}

/// Task store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MockTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task(task: Task) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.tasks.lock() {
            guard.insert(task.id.clone(), task);
        }
        store
    }
}

#[async_trait]
impl TaskStore for MockTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut guard = self.tasks.lock().map_err(|e| StoreError::Backend {
            reason: e.to_string(),
        })?;
        if guard.contains_key(&task.id) {
            return Err(StoreError::DuplicateId {
                id: task.id.to_string(),
            });
        }
        guard.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let guard = self.tasks.lock().map_err(|e| StoreError::Backend {
            reason: e.to_string(),
        })?;
        Ok(guard.get(id).cloned())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let guard = self.tasks.lock().map_err(|e| StoreError::Backend {
            reason: e.to_string(),
        })?;
        Ok(guard.len())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for engine types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_table_kind() -> impl Strategy<Value = TableKind> {
        prop::sample::select(TableKind::ALL.to_vec())
    }

    /// A text cell the way the backing store renders values: NULL, integers,
    /// two-place decimals, dates or short words.
    pub fn arb_cell() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            1 => Just(None),
            3 => (-100_000i64..100_000).prop_map(|v| Some(v.to_string())),
            3 => (-10_000_000i64..10_000_000).prop_map(|c| Some(format!("{:.2}", c as f64 / 100.0))),
            2 => (2000i32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| Some(format!("{:04}-{:02}-{:02}", y, m, d))),
            3 => "[a-z]{1,12}".prop_map(Some),
        ]
    }

    /// A result set with `1..=max_cols` columns and `0..=max_rows` rows.
    pub fn arb_result_set(max_cols: usize, max_rows: usize) -> impl Strategy<Value = ResultSet> {
        (1..=max_cols).prop_flat_map(move |cols| {
            prop::collection::vec(prop::collection::vec(arb_cell(), cols), 0..=max_rows)
                .prop_map(move |rows| {
                    let columns = (0..cols).map(|i| format!("c{}", i)).collect();
                    ResultSet::new(columns, rows)
                })
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pinned inputs for deterministic tests.

    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, Utc};
    use quarry_core::{draw_plan, template};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 2025-06-15 12:00:00, the reference time used across tests.
    pub fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 15)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default()
    }

    pub fn seeded_rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    /// First seed whose drawn plan satisfies `wanted`.
    ///
    /// Archetype, template and parameter are drawn before any row, so the
    /// seed pins them for every row count and clock.
    pub fn seed_where<F>(wanted: F) -> u64
    where
        F: Fn(&TaskPlan) -> bool,
    {
        (0..100_000u64)
            .find(|seed| {
                draw_plan(&mut seeded_rng(*seed), 0, fixed_now())
                    .map(|plan| wanted(&plan))
                    .unwrap_or(false)
            })
            .unwrap_or_else(|| panic!("no seed below 100000 draws the wanted plan"))
    }

    /// A stored task for `template_key` bound to physical table `table`.
    pub fn task_for(template_key: &str, table: &str, param: Option<quarry_core::ParamValue>) -> Task {
        let template = template(template_key)
            .unwrap_or_else(|| panic!("unknown template {}", template_key));
        let rendered = template.render(table, param);
        Task {
            id: TaskId::generate(),
            description: rendered.description,
            table_name: table.to_string(),
            kind: template.kind,
            template: template.key.to_string(),
            difficulty: template.difficulty,
            created_at: Utc::now(),
            reference_query: rendered.reference_query,
        }
    }

    /// Single-column text result set.
    pub fn single_column(name: &str, values: &[&str]) -> ResultSet {
        ResultSet::new(
            vec![name.to_string()],
            values.iter().map(|v| vec![Some(v.to_string())]).collect(),
        )
    }

    /// Result set from literal rows.
    pub fn result_set(columns: &[&str], rows: &[&[Option<&str>]]) -> ResultSet {
        ResultSet::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        )
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over verification outcomes.

    use super::*;

    /// Assert the verdict is correct.
    pub fn assert_correct(result: &VerificationResult) {
        assert!(
            result.correct,
            "expected a correct verdict, got {:?}",
            result.message
        );
    }

    /// Assert the verdict is incorrect and its message contains `needle`.
    pub fn assert_incorrect_with(result: &VerificationResult, needle: &str) {
        assert!(!result.correct, "expected an incorrect verdict");
        let message = result.message.as_deref().unwrap_or_default();
        assert!(
            message.contains(needle),
            "message {:?} does not mention {:?}",
            message,
            needle
        );
    }

    /// Assert no physical table name leaked into learner-facing text.
    pub fn assert_no_physical_name(text: &str, table: &str) {
        assert!(
            !text.contains(table),
            "learner-facing text {:?} exposes {}",
            text,
            table
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::generate;

    #[test]
    fn test_fixture_task_renders_reference() {
        let task = fixtures::task_for("employees_above_average_salary", "practice_1", None);
        assert!(task.reference_query.contains("practice_1"));
        assert_eq!(task.kind, TableKind::Employees);
    }

    #[test]
    fn test_seed_where_pins_the_plan() {
        let seed = fixtures::seed_where(|plan| plan.template.key == "orders_by_status");
        let plan = quarry_core::draw_plan(&mut fixtures::seeded_rng(seed), 5, fixtures::fixed_now())
            .unwrap();
        assert_eq!(plan.template.key, "orders_by_status");
        assert_eq!(plan.rows.len(), 5);
    }

    #[tokio::test]
    async fn test_mock_provisioner_names_are_unique() {
        let provisioner = MockProvisioner::new();
        let archetype = archetype(TableKind::Orders);
        let rows = generate(archetype, 3, &mut fixtures::seeded_rng(1));
        let a = provisioner.provision(archetype, &rows).await.unwrap();
        let b = provisioner.provision(archetype, &rows).await.unwrap();
        assert_ne!(a.name, b.name);
        assert_eq!(provisioner.provisioned().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_store_rejects_duplicate_ids() {
        let task = fixtures::task_for("orders_by_status", "practice_2", None);
        let store = MockTaskStore::with_task(task.clone());
        assert!(matches!(
            store.insert(task).await,
            Err(StoreError::DuplicateId { .. })
        ));
        assert_eq!(store.len().await.unwrap(), 1);
    }
}
