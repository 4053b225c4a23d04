//! PostgreSQL Instance Provisioner
//!
//! Creates one uniquely named practice table per task and fills it with
//! generated rows. The generated table name is the only text ever
//! interpolated into SQL; it is validated against a strict identifier
//! pattern first. Row values always travel as bind parameters.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use once_cell::sync::Lazy;
use postgres_types::ToSql;
use quarry_core::{
    InstanceProvisioner, ProvisionError, ProvisionStage, Row, TableArchetype, TableInstance, Value,
};
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_postgres::error::SqlState;

use crate::telemetry::METRICS;

static TABLE_NAME_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").ok());

/// Whether `name` may be interpolated into SQL as a bare identifier.
pub fn is_safe_table_name(name: &str) -> bool {
    TABLE_NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

/// Provisioner backed by the shared connection pool.
pub struct PgProvisioner {
    pool: Pool,
    prefix: String,
    statement_timeout: Duration,
    deadline: Option<Duration>,
    seq: AtomicU64,
}

impl PgProvisioner {
    pub fn new(pool: Pool, prefix: impl Into<String>, statement_timeout: Duration) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            statement_timeout,
            deadline: None,
            seq: AtomicU64::new(0),
        }
    }

    /// Bound the whole provisioning call, including the wait for a pooled
    /// connection. Overrunning it is a [`ProvisionError::Timeout`] at the
    /// stage in progress.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// `{prefix}_{unix nanos}_{sequence}`. The sequence keeps names unique
    /// when two calls observe the same clock reading.
    pub fn next_table_name(&self) -> Result<String, ProvisionError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}_{}_{}", self.prefix, nanos, seq);

        if is_safe_table_name(&name) {
            Ok(name)
        } else {
            Err(ProvisionError::InvalidTableName { name })
        }
    }

    fn failure(
        &self,
        stage: ProvisionStage,
        table: &str,
        started: Instant,
        err: tokio_postgres::Error,
    ) -> ProvisionError {
        if err.code() == Some(&SqlState::QUERY_CANCELED) {
            return ProvisionError::Timeout {
                stage,
                table: table.to_string(),
                elapsed: started.elapsed(),
            };
        }
        tracing::error!(table = %table, stage = %stage, error = ?err, "Provisioning statement failed");
        ProvisionError::failed(stage, table, err)
    }

    async fn create_and_fill(
        &self,
        archetype: &'static TableArchetype,
        rows: &[Row],
        table: &str,
        started: Instant,
        stage: &StageTracker,
    ) -> Result<(), ProvisionError> {
        stage.enter(ProvisionStage::Connect);
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ProvisionError::failed(ProvisionStage::Connect, table, e))?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| self.failure(ProvisionStage::Connect, table, started, e))?;

        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis().max(1)
        ))
        .await
        .map_err(|e| self.failure(ProvisionStage::Connect, table, started, e))?;

        stage.enter(ProvisionStage::CreateTable);
        tx.batch_execute(&create_table_sql(archetype, table))
            .await
            .map_err(|e| self.failure(ProvisionStage::CreateTable, table, started, e))?;

        stage.enter(ProvisionStage::InsertRows);
        if let Some(first) = rows.first() {
            let insert = tx
                .prepare(&insert_sql(table, first))
                .await
                .map_err(|e| self.failure(ProvisionStage::InsertRows, table, started, e))?;

            for row in rows {
                let params: Vec<&(dyn ToSql + Sync)> = row.values().map(bind).collect();
                tx.execute(&insert, &params)
                    .await
                    .map_err(|e| self.failure(ProvisionStage::InsertRows, table, started, e))?;
            }
        }

        stage.enter(ProvisionStage::Commit);
        tx.commit()
            .await
            .map_err(|e| self.failure(ProvisionStage::Commit, table, started, e))
    }
}

#[async_trait]
impl InstanceProvisioner for PgProvisioner {
    async fn provision(
        &self,
        archetype: &'static TableArchetype,
        rows: &[Row],
    ) -> Result<TableInstance, ProvisionError> {
        let started = Instant::now();
        let table = self.next_table_name()?;

        let stage = StageTracker::default();
        let work = self.create_and_fill(archetype, rows, &table, started, &stage);
        let result = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, work).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(table = %table, stage = %stage.current(), "Provisioning deadline exceeded");
                    Err(ProvisionError::Timeout {
                        stage: stage.current(),
                        table: table.clone(),
                        elapsed: started.elapsed(),
                    })
                }
            },
            None => work.await,
        };

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_provision(started.elapsed().as_secs_f64());
        }
        result?;

        tracing::debug!(
            table = %table,
            archetype = %archetype.kind,
            rows = rows.len(),
            duration_ms = started.elapsed().as_millis(),
            "Provisioned practice table"
        );

        Ok(TableInstance {
            name: table,
            kind: archetype.kind,
            row_count: rows.len(),
        })
    }
}

/// Last stage entered by an in-flight provisioning call, readable after the
/// call is abandoned.
#[derive(Debug)]
struct StageTracker(Mutex<ProvisionStage>);

impl Default for StageTracker {
    fn default() -> Self {
        Self(Mutex::new(ProvisionStage::Connect))
    }
}

impl StageTracker {
    fn enter(&self, stage: ProvisionStage) {
        if let Ok(mut current) = self.0.lock() {
            *current = stage;
        }
    }

    fn current(&self) -> ProvisionStage {
        self.0
            .lock()
            .map(|current| *current)
            .unwrap_or(ProvisionStage::Connect)
    }
}

/// `CREATE TABLE` for a validated table name.
pub(crate) fn create_table_sql(archetype: &TableArchetype, table: &str) -> String {
    let columns: Vec<String> = archetype.columns.iter().map(|c| c.definition()).collect();
    format!("CREATE TABLE {} ({})", table, columns.join(", "))
}

/// Parameterized single-row insert matching `row`'s column order. Decimal
/// parameters are sent as float8 and narrowed by the column's numeric type.
pub(crate) fn insert_sql(table: &str, row: &Row) -> String {
    let columns: Vec<&str> = row.columns().collect();
    let placeholders: Vec<String> = row
        .values()
        .enumerate()
        .map(|(i, value)| match value {
            Value::Decimal(_) => format!("${}::float8", i + 1),
            _ => format!("${}", i + 1),
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn bind(value: &Value) -> &(dyn ToSql + Sync) {
    match value {
        Value::Text(s) => s,
        Value::Decimal(v) => v,
        Value::Int(v) => v,
        Value::Date(d) => d,
        Value::Timestamp(t) => t,
    }
}
