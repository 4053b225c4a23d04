//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres, plus the read-only
//! execution path used for learner and reference queries.
//!
//! Every query runs inside a `READ ONLY` transaction with a local statement
//! timeout and is always rolled back. Results are fetched over the simple
//! query protocol so every cell arrives as text, whatever its SQL type.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use quarry_core::{ColumnInfo, ExecError, QueryExecutor, QueryFailure, ResultSet};
use std::time::{Duration, Instant};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, SimpleQueryMessage};

use crate::error::{ApiError, ApiResult};
use crate::telemetry::METRICS;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection wait timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "quarry".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Unset variables fall back to defaults; set but unparseable values are
    /// an error.
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: std::env::var("QUARRY_DB_HOST").unwrap_or(defaults.host),
            port: parse_env("QUARRY_DB_PORT")?.unwrap_or(defaults.port),
            dbname: std::env::var("QUARRY_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("QUARRY_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("QUARRY_DB_PASSWORD").unwrap_or(defaults.password),
            max_size: parse_env("QUARRY_DB_POOL_SIZE")?.unwrap_or(defaults.max_size),
            timeout: parse_env("QUARRY_DB_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> ApiResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ApiError::invalid_input(format!("Invalid {}: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client wrapping the connection pool.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
    query_timeout: Duration,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig, query_timeout: Duration) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool, query_timeout))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Get a connection from the pool.
    pub(crate) async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// Verify database connectivity.
    pub async fn health_check(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn run_in_read_only_tx(&self, sql: &str) -> Result<ResultSet, ExecError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            tracing::error!("Connection pool error: {:?}", e);
            ExecError::Backend {
                reason: e.to_string(),
            }
        })?;

        let tx = conn
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(backend)?;

        // Integer milliseconds only, nothing user-controlled reaches this string.
        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.query_timeout.as_millis().max(1)
        ))
        .await
        .map_err(backend)?;

        let outcome = tx.simple_query(sql).await;

        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "Rollback of read-only transaction failed");
        }

        let messages = outcome.map_err(|e| {
            let failure = classify_failure(&e);
            match failure {
                Some(failure) => {
                    tracing::debug!(sqlstate = ?e.code().map(SqlState::code), error = %e, "Query rejected");
                    ExecError::Query { failure }
                }
                None => backend(e),
            }
        })?;

        Ok(collect_result(messages))
    }
}

fn backend(err: tokio_postgres::Error) -> ExecError {
    tracing::error!("Database error: {:?}", err);
    ExecError::Backend {
        reason: err.to_string(),
    }
}

/// Fold simple-query messages into a text result set. Only the first
/// statement's rows are kept.
fn collect_result(messages: Vec<SimpleQueryMessage>) -> ResultSet {
    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::new();

    for message in messages {
        match message {
            SimpleQueryMessage::RowDescription(description) => {
                if columns.is_empty() {
                    columns = description.iter().map(|c| c.name().to_string()).collect();
                }
            }
            SimpleQueryMessage::Row(row) => {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                let cells = (0..row.len())
                    .map(|i| row.get(i).map(str::to_string))
                    .collect();
                rows.push(cells);
            }
            SimpleQueryMessage::CommandComplete(_) => break,
            _ => {}
        }
    }

    ResultSet::new(columns, rows)
}

/// Map a backend error to the learner-facing failure class. `None` means the
/// failure was not the statement's fault.
pub(crate) fn classify_failure(err: &tokio_postgres::Error) -> Option<QueryFailure> {
    err.code().and_then(|state| failure_for_sqlstate(state.code()))
}

/// SQLSTATE code to failure class. Only classes a statement can cause map to
/// a failure; connection, resource, transaction-rollback, operator
/// intervention and internal errors return `None`.
pub(crate) fn failure_for_sqlstate(code: &str) -> Option<QueryFailure> {
    let failure = match code {
        "42601" | "42P02" => QueryFailure::Syntax,
        "42703" => QueryFailure::UndefinedColumn,
        "42P01" => QueryFailure::UndefinedTable,
        "42883" => QueryFailure::UndefinedFunction,
        "42804" | "42846" | "42725" | "22P02" | "22007" | "22008" => QueryFailure::TypeMismatch,
        "22012" => QueryFailure::DivisionByZero,
        "42803" => QueryFailure::Grouping,
        "25006" | "42501" => QueryFailure::ReadOnly,
        "57014" => QueryFailure::Timeout,
        _ if code.starts_with("42") => QueryFailure::Syntax,
        // data exception, cardinality violation, unsupported feature,
        // program limit exceeded
        _ if ["22", "21", "0A", "54"].iter().any(|class| code.starts_with(class)) => {
            QueryFailure::Other
        }
        _ => return None,
    };
    Some(failure)
}

#[async_trait]
impl QueryExecutor for DbClient {
    async fn run_read_only(&self, sql: &str) -> Result<ResultSet, ExecError> {
        let start = Instant::now();
        let result = self.run_in_read_only_tx(sql).await;
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_db_operation("query", result.is_ok(), start.elapsed().as_secs_f64());
        }
        result
    }

    async fn schema_of(&self, table: &str) -> Result<Vec<ColumnInfo>, ExecError> {
        let conn = self.pool.get().await.map_err(|e| ExecError::Backend {
            reason: e.to_string(),
        })?;

        let rows = conn
            .query(
                "SELECT column_name::text, data_type::text, is_nullable::text \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(backend)?;

        Ok(rows
            .iter()
            .map(|row| {
                let nullable: String = row.get(2);
                ColumnInfo {
                    name: row.get(0),
                    data_type: row.get(1),
                    nullable: nullable == "YES",
                }
            })
            .collect())
    }
}
