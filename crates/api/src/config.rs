//! Application configuration
//!
//! Loaded from an optional `fleetflow.toml`, then overridden by environment variables
//! such as `FLEETFLOW__SERVER__BIND_ADDR` or `FLEETFLOW__SCORING__FLOOR=banded`.

use crate::rate_limit::RateLimitConfig;
use config::{Config, ConfigError, Environment, File};
use safety_scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use trip_worker::WorkerConfig;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL; `sqlite::memory:` keeps everything in process
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://fleetflow.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `fleetflow_api=debug,info`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub scoring: ScoringConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load `fleetflow.toml` (if present) and `FLEETFLOW__*` environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("fleetflow")
    }

    /// Load from the named config file (extension optional) plus environment overrides
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("FLEETFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
