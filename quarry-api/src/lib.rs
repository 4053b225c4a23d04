//! Quarry API - PostgreSQL Plumbing and REST Surface
//!
//! Provisions practice tables, stores tasks, runs candidate and reference
//! queries read-only, and serves the whole engine over HTTP.

pub mod composer;
pub mod config;
pub mod db;
pub mod error;
pub mod openapi;
pub mod provision;
pub mod routes;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod verifier;

pub use composer::TaskComposer;
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use openapi::ApiDoc;
pub use provision::{is_safe_table_name, PgProvisioner};
pub use routes::create_api_router;
pub use routes::health::HealthProbe;
pub use state::AppState;
pub use store::{InMemoryTaskStore, PgTaskStore};
pub use types::CheckSolutionRequest;
pub use verifier::{SolutionVerifier, RESTRICTED_IDENTIFIERS};
