//! Solution Verifier
//!
//! Looks up a task, runs the learner's query and the task's reference query
//! against the same table, and compares the two results.
//!
//! Learner mistakes (refused statements, failing SQL, wrong rows) come back
//! as an incorrect [`VerificationResult`]. Only service faults are errors.

use quarry_core::{
    check_read_only, compare, has_top_level_order_by, mentions_identifier, rebind_table,
    ColumnInfo, EngineConfig, ExecError, Ordering, QueryExecutor, Task, TaskId, TaskStore,
    VerificationError, VerificationResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::telemetry::METRICS;

/// Identifiers a candidate may not name: the task registry and the catalogs
/// that would reveal other tables.
pub const RESTRICTED_IDENTIFIERS: &[&str] = &["quarry_tasks", "information_schema", "pg_catalog"];

pub struct SolutionVerifier {
    store: Arc<dyn TaskStore>,
    executor: Arc<dyn QueryExecutor>,
    config: EngineConfig,
}

impl SolutionVerifier {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<dyn QueryExecutor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Two statements plus the lookup, each bounded by the statement timeout
    /// on the database side.
    fn deadline(&self) -> Duration {
        self.config.query_timeout * 3
    }

    /// Check `candidate` against the task's reference result.
    pub async fn verify(
        &self,
        task_id: &TaskId,
        candidate: &str,
    ) -> Result<VerificationResult, VerificationError> {
        let deadline = self.deadline();
        let span = tracing::info_span!("verify_solution", task_id = %task_id);
        let outcome = tokio::time::timeout(deadline, self.verify_inner(task_id, candidate))
            .instrument(span)
            .await
            .unwrap_or(Err(VerificationError::Timeout(deadline)));

        let label = match &outcome {
            Ok(Verdict::Correct) => "correct",
            Ok(Verdict::Incorrect(_)) => "incorrect",
            Ok(Verdict::Rejected(_)) => "rejected",
            Err(_) => "error",
        };
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_verification(label);
        }

        outcome.map(Verdict::into_result)
    }

    async fn verify_inner(
        &self,
        task_id: &TaskId,
        candidate: &str,
    ) -> Result<Verdict, VerificationError> {
        let task = self.lookup(task_id).await?;
        let logical = task.kind.logical_name();

        if let Err(refusal) = check_read_only(candidate) {
            tracing::debug!(task_id = %task.id, reason = %refusal, "Candidate refused");
            return Ok(Verdict::Rejected(refusal.to_string()));
        }
        if let Some(name) = RESTRICTED_IDENTIFIERS
            .iter()
            .find(|name| mentions_identifier(candidate, name))
        {
            tracing::info!(task_id = %task.id, identifier = %name, "Candidate names a restricted table");
            return Ok(Verdict::Rejected(format!(
                "Only the {} table may be queried",
                logical
            )));
        }

        let statement = match rebind_table(candidate, logical, &task.table_name) {
            Ok(statement) => statement,
            Err(refusal) => return Ok(Verdict::Rejected(refusal.to_string())),
        };

        let actual = match self.executor.run_read_only(&statement).await {
            Ok(rows) => rows,
            Err(ExecError::Query { failure }) => {
                tracing::debug!(task_id = %task.id, failure = ?failure, "Candidate query failed");
                return Ok(Verdict::Incorrect(failure.learner_message().to_string()));
            }
            Err(ExecError::Backend { reason }) => {
                return Err(VerificationError::Backend { reason });
            }
        };

        let expected = self
            .executor
            .run_read_only(&task.reference_query)
            .await
            .map_err(|e| match e {
                ExecError::Backend { reason } => VerificationError::Backend { reason },
                failure @ ExecError::Query { .. } => VerificationError::ReferenceFailed {
                    task_id: task.id.to_string(),
                    table: task.table_name.clone(),
                    reason: failure.to_string(),
                },
            })?;

        let ordering = if has_top_level_order_by(candidate)
            || has_top_level_order_by(&task.reference_query)
        {
            Ordering::Ordered
        } else {
            Ordering::Unordered
        };

        match compare(&expected, &actual, ordering) {
            Ok(()) => {
                tracing::info!(task_id = %task.id, template = %task.template, "Solution accepted");
                Ok(Verdict::Correct)
            }
            Err(mismatch) => {
                tracing::debug!(task_id = %task.id, mismatch = ?mismatch, ordering = ?ordering, "Solution rejected");
                Ok(Verdict::Incorrect(mismatch.message()))
            }
        }
    }

    async fn lookup(&self, task_id: &TaskId) -> Result<Task, VerificationError> {
        self.store
            .get(task_id)
            .await?
            .ok_or_else(|| VerificationError::UnknownTask {
                id: task_id.to_string(),
            })
    }

    /// Columns of the task's table, for the learner schema hint.
    pub async fn schema_for(&self, task_id: &TaskId) -> Result<Vec<ColumnInfo>, VerificationError> {
        let task = self.lookup(task_id).await?;
        self.executor
            .schema_of(&task.table_name)
            .await
            .map_err(|e| VerificationError::Backend {
                reason: e.to_string(),
            })
    }
}

/// Internal verdict, kept apart from the wire type so metrics can tell a
/// refused statement from a wrong answer.
enum Verdict {
    Correct,
    Incorrect(String),
    Rejected(String),
}

impl Verdict {
    fn into_result(self) -> VerificationResult {
        match self {
            Verdict::Correct => VerificationResult::correct(),
            Verdict::Incorrect(message) | Verdict::Rejected(message) => {
                VerificationResult::incorrect(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{ParamValue, QueryFailure, ResultSet};
    use quarry_test_utils::assertions::{assert_correct, assert_incorrect_with};
    use quarry_test_utils::fixtures::{result_set, single_column, task_for};
    use quarry_test_utils::{MockExecutor, MockTaskStore};

    const TABLE: &str = "practice_1718000000_0";

    fn verifier(task: Task, executor: MockExecutor) -> SolutionVerifier {
        SolutionVerifier::new(
            Arc::new(MockTaskStore::with_task(task)),
            Arc::new(executor),
            EngineConfig::default(),
        )
    }

    fn sorted_names() -> ResultSet {
        single_column("first_name", &["Alice", "Bob", "Emma"])
    }

    fn shuffled_names() -> ResultSet {
        single_column("name", &["Emma", "Alice", "Bob"])
    }

    /// Answers the reference with `reference` and everything else with
    /// `candidate`.
    fn executor_for(
        task: &Task,
        reference: ResultSet,
        candidate: ResultSet,
    ) -> MockExecutor {
        let reference_sql = task.reference_query.clone();
        MockExecutor::new(move |sql| {
            if sql == reference_sql {
                Ok(reference.clone())
            } else {
                Ok(candidate.clone())
            }
        })
    }

    #[tokio::test]
    async fn test_reference_query_is_correct() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let reference = task.reference_query.clone();
        let executor = executor_for(&task, sorted_names(), sorted_names());
        let id = task.id.clone();

        let result = verifier(task, executor).verify(&id, &reference).await.unwrap();
        assert_correct(&result);
        assert_eq!(result.message.as_deref(), Some("Correct!"));
    }

    #[tokio::test]
    async fn test_logical_name_is_rebound() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = executor_for(&task, sorted_names(), sorted_names());
        let id = task.id.clone();
        let verifier = verifier(task, executor.clone());

        let result = verifier
            .verify(&id, "select * from Employees e")
            .await
            .unwrap();
        assert_correct(&result);
        assert!(executor.executed()[0].contains(TABLE));
        assert!(!executor.executed()[0].contains("Employees"));
    }

    #[tokio::test]
    async fn test_unordered_results_compare_as_multiset() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        assert!(!has_top_level_order_by(&task.reference_query));
        let executor = executor_for(&task, sorted_names(), shuffled_names());
        let id = task.id.clone();

        let result = verifier(task, executor)
            .verify(&id, "SELECT first_name FROM employees")
            .await
            .unwrap();
        assert_correct(&result);
    }

    #[tokio::test]
    async fn test_candidate_order_by_makes_order_significant() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = executor_for(&task, sorted_names(), shuffled_names());
        let id = task.id.clone();

        let result = verifier(task, executor)
            .verify(&id, "SELECT first_name FROM employees ORDER BY last_name")
            .await
            .unwrap();
        assert_incorrect_with(&result, "row 1");
    }

    #[tokio::test]
    async fn test_row_count_mismatch() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = executor_for(
            &task,
            sorted_names(),
            single_column("first_name", &["Alice"]),
        );
        let id = task.id.clone();

        let result = verifier(task, executor)
            .verify(&id, "SELECT first_name FROM employees LIMIT 1")
            .await
            .unwrap();
        assert_incorrect_with(&result, "1 row(s), expected 3");
    }

    #[tokio::test]
    async fn test_numeric_representation_differences_are_equal() {
        let task = task_for("customers_loyal", TABLE, Some(ParamValue::Int(2500)));
        let executor = executor_for(
            &task,
            result_set(&["points"], &[&[Some("3000.00")], &[Some("4100.50")]]),
            result_set(&["p"], &[&[Some("3000")], &[Some("4100.5")]]),
        );
        let id = task.id.clone();

        let result = verifier(task, executor)
            .verify(&id, "SELECT loyalty_points::float8 AS p FROM customers WHERE loyalty_points > 2500")
            .await
            .unwrap();
        assert_correct(&result);
    }

    #[tokio::test]
    async fn test_destructive_statement_never_executes() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = executor_for(&task, sorted_names(), sorted_names());
        let id = task.id.clone();
        let verifier = verifier(task, executor.clone());

        for sql in [
            "DROP TABLE employees",
            "DELETE FROM employees",
            "SELECT 1; DROP TABLE employees",
            "WITH d AS (DELETE FROM employees RETURNING *) SELECT * FROM d",
            "",
        ] {
            let result = verifier.verify(&id, sql).await.unwrap();
            assert!(!result.correct, "{} should be refused", sql);
        }
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_restricted_identifiers_are_refused() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = executor_for(&task, sorted_names(), sorted_names());
        let id = task.id.clone();
        let verifier = verifier(task, executor.clone());

        let result = verifier
            .verify(&id, "SELECT reference_query FROM quarry_tasks")
            .await
            .unwrap();
        assert_incorrect_with(&result, "Only the employees table");

        let result = verifier
            .verify(&id, "SELECT table_name FROM information_schema.tables")
            .await
            .unwrap();
        assert!(!result.correct);
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_candidate_failure_is_learner_message() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let reference_sql = task.reference_query.clone();
        let executor = MockExecutor::new(move |sql| {
            if sql == reference_sql {
                Ok(single_column("first_name", &["Alice"]))
            } else {
                Err(ExecError::Query {
                    failure: QueryFailure::UndefinedColumn,
                })
            }
        });
        let id = task.id.clone();

        let result = verifier(task, executor)
            .verify(&id, "SELECT nickname FROM employees")
            .await
            .unwrap();
        assert_incorrect_with(&result, "column that does not exist");
    }

    #[tokio::test]
    async fn test_reference_failure_is_error() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let reference_sql = task.reference_query.clone();
        let executor = MockExecutor::new(move |sql| {
            if sql == reference_sql {
                Err(ExecError::Query {
                    failure: QueryFailure::UndefinedTable,
                })
            } else {
                Ok(single_column("first_name", &["Alice"]))
            }
        });
        let id = task.id.clone();

        let err = verifier(task, executor)
            .verify(&id, "SELECT first_name FROM employees")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::ReferenceFailed { .. }));
    }

    #[tokio::test]
    async fn test_backend_failure_is_error() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = MockExecutor::new(|_| {
            Err(ExecError::Backend {
                reason: "pool closed".to_string(),
            })
        });
        let id = task.id.clone();

        let err = verifier(task, executor)
            .verify(&id, "SELECT * FROM employees")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_transient_fault_on_reference_is_not_an_inconsistency() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let reference_sql = task.reference_query.clone();
        let executor = MockExecutor::new(move |sql| {
            if sql == reference_sql {
                Err(ExecError::Backend {
                    reason: "terminating connection due to administrator command".to_string(),
                })
            } else {
                Ok(single_column("first_name", &["Alice"]))
            }
        });
        let id = task.id.clone();

        let err = verifier(task, executor)
            .verify(&id, "SELECT first_name FROM employees")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let executor = executor_for(&task, sorted_names(), sorted_names());
        let verifier = verifier(task, executor);

        let err = verifier
            .verify(&TaskId::from("task_missing"), "SELECT 1")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VerificationError::UnknownTask {
                id: "task_missing".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_schema_for_uses_physical_name() {
        let task = task_for("employees_above_average_salary", TABLE, None);
        let columns = vec![ColumnInfo {
            name: "id".to_string(),
            data_type: "integer".to_string(),
            nullable: false,
        }];
        let executor = MockExecutor::new(|_| Ok(single_column("x", &[])))
            .with_schema(TABLE, columns.clone());
        let id = task.id.clone();

        let schema = verifier(task, executor).schema_for(&id).await.unwrap();
        assert_eq!(schema, columns);
    }
}
