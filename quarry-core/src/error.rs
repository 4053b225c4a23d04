//! Error types for Quarry operations

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::schema::TableKind;

/// Catalog consistency errors. Any of these is fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Archetype {kind} must have exactly one identifier column, found {count}")]
    IdentifierCount { kind: TableKind, count: usize },

    #[error("Archetype {kind} declares column {column} more than once")]
    DuplicateColumn { kind: TableKind, column: String },

    #[error("Archetype {kind} column {column} has an invalid generation policy: {reason}")]
    InvalidPolicy {
        kind: TableKind,
        column: String,
        reason: String,
    },

    #[error("Archetype {kind} has no registered templates")]
    NoTemplates { kind: TableKind },

    #[error("Template {template} requires column {column} missing from {kind}")]
    UnknownColumn {
        template: String,
        kind: TableKind,
        column: String,
    },

    #[error("Template {template} is malformed: {reason}")]
    MalformedTemplate { template: String, reason: String },

    #[error("Template key {template} is registered more than once")]
    DuplicateTemplate { template: String },
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Stage of provisioning at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStage {
    Naming,
    Connect,
    CreateTable,
    InsertRows,
    Commit,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionStage::Naming => "naming",
            ProvisionStage::Connect => "connect",
            ProvisionStage::CreateTable => "create_table",
            ProvisionStage::InsertRows => "insert_rows",
            ProvisionStage::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// Instance provisioning errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Generated table name {name:?} is not a safe identifier")]
    InvalidTableName { name: String },

    #[error("Provisioning {table} failed at {stage}: {reason}")]
    Failed {
        stage: ProvisionStage,
        table: String,
        reason: String,
    },

    #[error("Provisioning {table} timed out after {elapsed:?} at {stage}")]
    Timeout {
        stage: ProvisionStage,
        table: String,
        elapsed: Duration,
    },
}

impl ProvisionError {
    pub fn failed(stage: ProvisionStage, table: &str, reason: impl fmt::Display) -> Self {
        ProvisionError::Failed {
            stage,
            table: table.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn stage(&self) -> ProvisionStage {
        match self {
            ProvisionError::InvalidTableName { .. } => ProvisionStage::Naming,
            ProvisionError::Failed { stage, .. } | ProvisionError::Timeout { stage, .. } => *stage,
        }
    }
}

/// Lookup store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Task {id} is already stored")]
    DuplicateId { id: String },

    #[error("Task store backend failed: {reason}")]
    Backend { reason: String },

    #[error("Stored task {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Task composition errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompositionError {
    #[error("No archetype has a registered template")]
    NoArchetypes,

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Failed to record task: {0}")]
    Store(#[from] StoreError),

    #[error("Task composition timed out after {0:?}")]
    Timeout(Duration),
}

/// Why a candidate query was refused or failed. Learner-facing, never a
/// service error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("{reason}")]
    Disallowed { reason: String },

    #[error("{message}")]
    InvalidQuery { message: String },
}

impl CandidateError {
    pub fn disallowed(reason: impl Into<String>) -> Self {
        CandidateError::Disallowed {
            reason: reason.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CandidateError::InvalidQuery {
            message: message.into(),
        }
    }
}

/// Class of a query execution failure reported by a [`crate::QueryExecutor`].
///
/// Only the class crosses the seam; the raw backend text stays in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFailure {
    Syntax,
    UndefinedColumn,
    UndefinedTable,
    UndefinedFunction,
    TypeMismatch,
    DivisionByZero,
    Grouping,
    ReadOnly,
    Timeout,
    Other,
}

impl QueryFailure {
    /// Fixed learner-facing message for this class.
    pub fn learner_message(&self) -> &'static str {
        match self {
            QueryFailure::Syntax => "The query has a syntax error",
            QueryFailure::UndefinedColumn => "The query references a column that does not exist",
            QueryFailure::UndefinedTable => "The query references a table that does not exist",
            QueryFailure::UndefinedFunction => {
                "The query calls a function or operator that does not exist for these types"
            }
            QueryFailure::TypeMismatch => "The query compares or combines incompatible types",
            QueryFailure::DivisionByZero => "The query divides by zero",
            QueryFailure::Grouping => {
                "A selected column must appear in GROUP BY or be used in an aggregate"
            }
            QueryFailure::ReadOnly => "Only read-only queries are allowed",
            QueryFailure::Timeout => "The query exceeded the time limit",
            QueryFailure::Other => "The query failed to execute",
        }
    }
}

/// Execution errors raised at the executor seam.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    /// The statement ran and the backend rejected it.
    #[error("Query rejected: {failure:?}")]
    Query { failure: QueryFailure },

    /// The backend itself is unavailable (pool, connection, transaction).
    #[error("Backend unavailable: {reason}")]
    Backend { reason: String },
}

/// Solution verification errors. Learner mistakes are not errors; they are
/// reported as an incorrect [`crate::VerificationResult`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Unknown task {id}")]
    UnknownTask { id: String },

    #[error("Reference query for task {task_id} on {table} failed: {reason}")]
    ReferenceFailed {
        task_id: String,
        table: String,
        reason: String,
    },

    #[error("Verification backend failed: {reason}")]
    Backend { reason: String },

    #[error("Verification timed out after {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for VerificationError {
    fn from(err: StoreError) -> Self {
        VerificationError::Backend {
            reason: err.to_string(),
        }
    }
}

/// Result alias for catalog checks.
pub type CatalogResult<T> = Result<T, CatalogError>;
