//! Quarry Core - SQL Practice Engine
//!
//! Schema catalog, synthetic data, task templates, the read-only guard and
//! result-set comparison. Everything here is pure; storage access goes
//! through the traits in [`traits`].

pub mod compare;
pub mod compose;
pub mod config;
pub mod consistency;
pub mod error;
pub mod generator;
pub mod guard;
pub mod schema;
pub mod task;
pub mod template;
pub mod traits;
pub mod value;

pub use compare::{compare, Cell, Mismatch, Ordering, ResultSet, NUMERIC_TOLERANCE};
pub use compose::{draw_plan, pick_uniform, TaskPlan};
pub use config::{EngineConfig, TaskStoreKind};
pub use consistency::{check_catalog, check_catalog_with, composable_kinds};
pub use error::{
    CandidateError, CatalogError, CatalogResult, CompositionError, ConfigError, ExecError,
    ProvisionError, ProvisionStage, QueryFailure, StoreError, VerificationError,
};
pub use generator::{generate, generate_at};
pub use guard::{check_read_only, has_top_level_order_by, mentions_identifier, rebind_table};
pub use schema::{
    archetype, archetypes, ColumnSpec, HistoryWindow, LogicalType, TableArchetype, TableKind,
    ValueSource,
};
pub use task::{ColumnInfo, TableInstance, Task, TaskId, TaskView, Timestamp, VerificationResult};
pub use template::{
    compatible_templates, template, templates, Difficulty, ParamKind, ParamValue,
    RenderedTemplate, TaskTemplate,
};
pub use traits::{InstanceProvisioner, QueryExecutor, TaskStore};
pub use value::{Row, Value};
