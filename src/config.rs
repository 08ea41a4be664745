//! Pipeline configuration from environment variables

use crate::dds::SatelliteMode;
use std::env;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 25;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the pipeline runtime
///
/// Loaded from environment variables with defaults for local runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// SQLite file holding the stg, dds, cdm tables and the cache
    pub db_path: String,

    /// Directory of `*.sql` migrations
    pub schema_dir: String,

    /// Directory of file-backed topics
    pub topic_dir: String,

    pub source_topic: String,
    pub stg_output_topic: String,
    pub dds_output_topic: String,

    /// Messages per stage invocation
    pub batch_size: usize,

    /// Seconds between invocations, 0 runs once
    pub run_interval_secs: u64,

    pub satellite_mode: SatelliteMode,

    /// JSON object file `{key: entity}` loaded into the cache at startup
    pub cache_seed_path: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ORDERFLOW_DB_PATH` (default: data/orderflow.db)
    /// - `ORDERFLOW_SCHEMA_DIR` (default: sql)
    /// - `ORDERFLOW_TOPIC_DIR` (default: data/topics)
    /// - `STG_SOURCE_TOPIC` (default: order-service_orders)
    /// - `STG_SERVICE_ORDERS_TOPIC` (default: stg-service-orders)
    /// - `DDS_SERVICE_ORDERS_TOPIC` (default: dds-service-orders)
    /// - `BATCH_SIZE` (default: 100, zero or unparsable falls back to it)
    /// - `RUN_INTERVAL_SECS` (default: 25)
    /// - `DDS_SATELLITE_MODE` (`always` | `skip_unchanged`, default: always)
    /// - `CACHE_SEED_PATH` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &str, default: &str| -> Result<String, ConfigError> {
            match lookup(name) {
                None => Ok(default.to_string()),
                Some(value) if value.trim().is_empty() => {
                    Err(ConfigError::MissingVariable(name.to_string()))
                }
                Some(value) => Ok(value),
            }
        };

        let batch_size = lookup("BATCH_SIZE")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let run_interval_secs = lookup("RUN_INTERVAL_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_RUN_INTERVAL_SECS);

        let satellite_mode = match lookup("DDS_SATELLITE_MODE") {
            None => SatelliteMode::default(),
            Some(mode) => SatelliteMode::parse(&mode).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "DDS_SATELLITE_MODE must be 'always' or 'skip_unchanged', got '{}'",
                    mode
                ))
            })?,
        };

        let cache_seed_path = lookup("CACHE_SEED_PATH").filter(|s| !s.trim().is_empty());

        Ok(Self {
            db_path: text("ORDERFLOW_DB_PATH", "data/orderflow.db")?,
            schema_dir: text("ORDERFLOW_SCHEMA_DIR", "sql")?,
            topic_dir: text("ORDERFLOW_TOPIC_DIR", "data/topics")?,
            source_topic: text("STG_SOURCE_TOPIC", "order-service_orders")?,
            stg_output_topic: text("STG_SERVICE_ORDERS_TOPIC", "stg-service-orders")?,
            dds_output_topic: text("DDS_SERVICE_ORDERS_TOPIC", "dds-service-orders")?,
            batch_size,
            run_interval_secs,
            satellite_mode,
            cache_seed_path,
        })
    }
}
