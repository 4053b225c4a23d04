//! API Configuration Module
//!
//! CORS and listener settings. Configuration is loaded from environment
//! variables with defaults suited to local development.

use std::net::SocketAddr;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Listener host.
    pub bind_host: String,

    /// Listener port.
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `QUARRY_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `QUARRY_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `QUARRY_API_BIND`: Listener host (default: 0.0.0.0)
    /// - `PORT` or `QUARRY_API_PORT`: Listener port (default: 8080)
    pub fn from_env() -> ApiResult<Self> {
        let defaults = Self::default();

        let cors_origins = std::env::var("QUARRY_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .unwrap_or_default();

        let cors_max_age_secs = match std::env::var("QUARRY_CORS_MAX_AGE_SECS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ApiError::invalid_input(format!("Invalid QUARRY_CORS_MAX_AGE_SECS: {}", raw))
            })?,
            Err(_) => defaults.cors_max_age_secs,
        };

        let bind_host = std::env::var("QUARRY_API_BIND").unwrap_or(defaults.bind_host);

        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("QUARRY_API_PORT").ok())
        {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        Ok(Self {
            cors_origins,
            cors_max_age_secs,
            bind_host,
            port,
        })
    }

    /// Check if running with a strict origin list.
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}
