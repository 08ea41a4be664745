//! Runtime wiring: stage selection, processor construction, scheduling
//!
//! ```text
//! <topic_dir>/order-service_orders.jsonl ──▶ stg ──▶ stg-service-orders.jsonl
//!                                                          │
//!                      dds-service-orders.jsonl ◀── dds ◀──┘
//!                                │
//!                                └──▶ cdm
//! ```
//!
//! All stages share one SQLite connection; the cache reads `cache_entries` from
//! the same database.

use crate::broker::{BrokerError, JsonlConsumer, JsonlProducer};
use crate::cache::{CacheError, CacheLookup, SqliteCache};
use crate::cdm::{CdmMessageProcessor, SqliteCdmRepository};
use crate::config::{ConfigError, PipelineConfig};
use crate::db::SharedConnection;
use crate::dds::{DdsMessageProcessor, SqliteDdsRepository};
use crate::processor::{BatchProcessor, ProcessorError};
use crate::stg::{SqliteStgRepository, StgMessageProcessor};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Stg,
    Dds,
    Cdm,
    All,
}

impl Stage {
    /// Parse `--stage stg|dds|cdm|all`, defaulting to `all`
    pub fn parse_from_args(args: &[String]) -> Result<Stage, ConfigError> {
        let Some(idx) = args.iter().position(|x| x == "--stage") else {
            return Ok(Stage::All);
        };

        match args.get(idx + 1).map(|s| s.as_str()) {
            Some("stg") => Ok(Stage::Stg),
            Some("dds") => Ok(Stage::Dds),
            Some("cdm") => Ok(Stage::Cdm),
            Some("all") => Ok(Stage::All),
            Some(other) => Err(ConfigError::InvalidValue(format!(
                "--stage must be one of stg, dds, cdm, all, got '{}'",
                other
            ))),
            None => Err(ConfigError::InvalidValue(
                "--stage requires a value".to_string(),
            )),
        }
    }

    fn includes(self, stage: Stage) -> bool {
        self == Stage::All || self == stage
    }
}

/// `--once` forces a single invocation regardless of `RUN_INTERVAL_SECS`
pub fn parse_once_from_args(args: &[String]) -> bool {
    args.iter().any(|x| x == "--once")
}

/// Failure while wiring the processors
#[derive(Debug)]
pub enum RuntimeError {
    Broker(BrokerError),
    Cache(CacheError),
}

impl From<BrokerError> for RuntimeError {
    fn from(err: BrokerError) -> Self {
        RuntimeError::Broker(err)
    }
}

impl From<CacheError> for RuntimeError {
    fn from(err: CacheError) -> Self {
        RuntimeError::Cache(err)
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::Broker(e) => write!(f, "Broker error: {}", e),
            RuntimeError::Cache(e) => write!(f, "Cache error: {}", e),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Build the processors of the selected stages over file-backed topics.
///
/// Returned in pipeline order (stg, dds, cdm). Each stage consumes as its own
/// consumer group, named after the stage.
pub fn build_processors(
    stage: Stage,
    config: &PipelineConfig,
    conn: SharedConnection,
) -> Result<Vec<Box<dyn BatchProcessor>>, RuntimeError> {
    let mut processors: Vec<Box<dyn BatchProcessor>> = Vec::new();
    let topic_dir = config.topic_dir.as_str();

    if stage.includes(Stage::Stg) {
        let cache = SqliteCache::new(conn.clone());
        if let Some(seed) = &config.cache_seed_path {
            cache.load_seed_file(seed)?;
        }

        processors.push(Box::new(StgMessageProcessor::new(
            Box::new(JsonlConsumer::open(topic_dir, &config.source_topic, "stg")?),
            Box::new(JsonlProducer::open(topic_dir, &config.stg_output_topic)?),
            CacheLookup::new(Arc::new(cache)),
            Arc::new(SqliteStgRepository::new(conn.clone())),
            config.batch_size,
        )));
    }

    if stage.includes(Stage::Dds) {
        processors.push(Box::new(DdsMessageProcessor::new(
            Box::new(JsonlConsumer::open(topic_dir, &config.stg_output_topic, "dds")?),
            Box::new(JsonlProducer::open(topic_dir, &config.dds_output_topic)?),
            Arc::new(SqliteDdsRepository::new(conn.clone(), config.satellite_mode)),
            config.batch_size,
        )));
    }

    if stage.includes(Stage::Cdm) {
        processors.push(Box::new(CdmMessageProcessor::new(
            Box::new(JsonlConsumer::open(topic_dir, &config.dds_output_topic, "cdm")?),
            Arc::new(SqliteCdmRepository::new(conn)),
            config.batch_size,
        )));
    }

    log::info!("✅ {} stage processor(s) ready", processors.len());

    Ok(processors)
}

/// Run one batch of every processor, in order.
///
/// A failing stage does not stop the stages after it. The first error is
/// returned once all of them ran.
pub async fn run_once(processors: &mut [Box<dyn BatchProcessor>]) -> Result<(), ProcessorError> {
    let mut first_error = None;

    for processor in processors.iter_mut() {
        if let Err(e) = processor.run().await {
            log::error!("❌ [{}] batch failed: {}", processor.stage(), e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Drive the processors on a fixed interval.
///
/// With `interval_secs == 0` a single invocation runs and its error, if any, is
/// returned. Otherwise this never returns: a failed tick is logged and the next
/// tick runs again from the last committed offsets.
pub async fn run_scheduled(
    processors: &mut [Box<dyn BatchProcessor>],
    interval_secs: u64,
) -> Result<(), ProcessorError> {
    if interval_secs == 0 {
        return run_once(processors).await;
    }

    log::info!("⏰ Starting stage scheduler (interval: {}s)", interval_secs);

    let mut timer = interval(Duration::from_secs(interval_secs));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if run_once(processors).await.is_err() {
            log::warn!("⚠️  Tick finished with errors, retrying on next tick");
        }
    }
}
