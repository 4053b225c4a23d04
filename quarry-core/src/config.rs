//! Engine configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Which lookup store backs task ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStoreKind {
    Memory,
    Postgres,
}

impl fmt::Display for TaskStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStoreKind::Memory => f.write_str("memory"),
            TaskStoreKind::Postgres => f.write_str("postgres"),
        }
    }
}

impl FromStr for TaskStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(TaskStoreKind::Memory),
            "postgres" | "postgresql" => Ok(TaskStoreKind::Postgres),
            _ => Err(format!("expected memory or postgres, got {}", s)),
        }
    }
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows generated per provisioned table.
    pub row_count: usize,
    /// Statement timeout for candidate and reference queries.
    pub query_timeout: Duration,
    /// Overall deadline for composing one task.
    pub compose_timeout: Duration,
    pub task_store: TaskStoreKind,
    /// Prefix of physical table names.
    pub table_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_count: 50,
            query_timeout: Duration::from_millis(5000),
            compose_timeout: Duration::from_millis(15000),
            task_store: TaskStoreKind::Memory,
            table_prefix: "practice".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `QUARRY_ROW_COUNT`: Rows per generated table (default: 50)
    /// - `QUARRY_QUERY_TIMEOUT_MS`: Per-query statement timeout (default: 5000)
    /// - `QUARRY_COMPOSE_TIMEOUT_MS`: Deadline for composing a task (default: 15000)
    /// - `QUARRY_TASK_STORE`: `memory` or `postgres` (default: memory)
    /// - `QUARRY_TABLE_PREFIX`: Physical table name prefix (default: practice)
    ///
    /// A variable that is set but unparseable is an error, not a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            row_count: parse_var(&lookup, "QUARRY_ROW_COUNT")?.unwrap_or(defaults.row_count),
            query_timeout: parse_var(&lookup, "QUARRY_QUERY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.query_timeout),
            compose_timeout: parse_var(&lookup, "QUARRY_COMPOSE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.compose_timeout),
            task_store: parse_var(&lookup, "QUARRY_TASK_STORE")?.unwrap_or(defaults.task_store),
            table_prefix: lookup("QUARRY_TABLE_PREFIX").unwrap_or(defaults.table_prefix),
        };
        config.validate()?;
        Ok(config)
    }

    /// Budget for provisioning inside a composition: four fifths of the
    /// compose timeout, so a slow provision surfaces as a provisioning
    /// timeout before the composition deadline fires.
    pub fn provision_deadline(&self) -> Duration {
        self.compose_timeout.mul_f64(0.8)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_timeout.is_zero() {
            return Err(invalid(
                "query_timeout",
                format!("{:?}", self.query_timeout),
                "query_timeout must be positive",
            ));
        }

        if self.compose_timeout.is_zero() {
            return Err(invalid(
                "compose_timeout",
                format!("{:?}", self.compose_timeout),
                "compose_timeout must be positive",
            ));
        }

        // Leaves room for `_{nanos}_{seq}` inside the 63 byte identifier limit.
        let prefix_ok = self.table_prefix.len() <= 20
            && self
                .table_prefix
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_lowercase())
            && self
                .table_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !prefix_ok {
            return Err(invalid(
                "table_prefix",
                self.table_prefix.clone(),
                "table_prefix must be 1-20 chars of [a-z0-9_] starting with a letter",
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(key, raw.clone(), e.to_string())),
    }
}

fn invalid(field: &str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.row_count, 50);
        assert_eq!(config.task_store, TaskStoreKind::Memory);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("QUARRY_ROW_COUNT", "10"),
            ("QUARRY_QUERY_TIMEOUT_MS", "250"),
            ("QUARRY_TASK_STORE", "Postgres"),
            ("QUARRY_TABLE_PREFIX", "drill"),
        ]))
        .unwrap();
        assert_eq!(config.row_count, 10);
        assert_eq!(config.query_timeout, Duration::from_millis(250));
        assert_eq!(config.task_store, TaskStoreKind::Postgres);
        assert_eq!(config.table_prefix, "drill");
    }

    #[test]
    fn test_unparseable_value_fails() {
        let err = EngineConfig::from_lookup(lookup(&[("QUARRY_ROW_COUNT", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "QUARRY_ROW_COUNT"));

        assert!(EngineConfig::from_lookup(lookup(&[("QUARRY_TASK_STORE", "redis")])).is_err());
    }

    #[test]
    fn test_provision_deadline_precedes_compose_timeout() {
        let config = EngineConfig::default();
        assert_eq!(config.provision_deadline(), Duration::from_millis(12000));
        assert!(config.provision_deadline() < config.compose_timeout);
    }

    #[test]
    fn test_validation() {
        assert!(EngineConfig::from_lookup(lookup(&[("QUARRY_QUERY_TIMEOUT_MS", "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("QUARRY_TABLE_PREFIX", "Practice")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("QUARRY_TABLE_PREFIX", "x; drop")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("QUARRY_TABLE_PREFIX", "")])).is_err());
    }
}
